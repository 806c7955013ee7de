//! Name-keyed registry of lazily created breakers.
//!
//! # Responsibilities
//! - Hand out "the breaker for dependency X" without callers coordinating
//!   construction
//! - Operational reset of one or all breakers
//! - State snapshots for status endpoints
//!
//! # Design Decisions
//! - Owned object, not a process-wide singleton; whoever assembles the
//!   service owns it
//! - Read lock for the common hit path, double-checked under the write lock
//!   before constructing, so each name gets at most one breaker
//! - Entries live as long as the registry; there is no eviction
//! - Breakers are cloned out before resets or state reads so no breaker
//!   work happens under the registry lock

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::resilience::settings::Settings;
use crate::resilience::state::State;

/// Concurrent map from dependency name to its breaker.
#[derive(Debug)]
pub struct Registry {
    defaults: Settings,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Registry {
    /// Create a registry whose lazily created breakers use `defaults`.
    pub fn new(defaults: Settings) -> Self {
        Self {
            defaults,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for `name`, created with the registry defaults on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, || self.defaults.clone())
    }

    /// The breaker for `name`, created with `settings()` on first use.
    /// An existing breaker is returned unchanged.
    pub fn get_or_create_with<F>(&self, name: &str, settings: F) -> Arc<CircuitBreaker>
    where
        F: FnOnce() -> Settings,
    {
        if let Some(existing) = self.lookup(name) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = breakers.get(name) {
            return Arc::clone(existing);
        }

        tracing::info!(breaker = %name, "Creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(name, settings()));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// The breaker for `name` if one was already created.
    pub fn lookup(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Force the named breaker back to Closed. Returns false if it does not exist.
    pub fn reset(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Force every breaker back to Closed. Returns how many were reset.
    pub fn reset_all(&self) -> usize {
        let breakers = self.all();
        for breaker in &breakers {
            breaker.reset();
        }
        breakers.len()
    }

    /// Name → effective state for every breaker.
    pub fn list(&self) -> BTreeMap<String, State> {
        self.all()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.state()))
            .collect()
    }

    /// Full snapshots, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.all().iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Settings::registry_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_get_returns_same_instance() {
        let registry = Registry::default();
        let a = registry.get("legal-data");
        let b = registry.get("legal-data");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_does_not_create() {
        let registry = Registry::default();
        assert!(registry.lookup("idp").is_none());
        assert!(registry.is_empty());
        assert!(!registry.reset("idp"));
    }

    #[test]
    fn test_explicit_settings_apply_only_on_creation() {
        let registry = Registry::default();
        let first = registry.get_or_create_with("opa", || {
            Settings::new().with_timeout(Duration::from_secs(5))
        });
        let second = registry.get_or_create_with("opa", || unreachable!("already created"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_all_and_list() {
        let registry = Registry::default();
        for name in ["idp", "opa"] {
            let breaker = registry.get(name);
            for _ in 0..3 {
                let _ = breaker
                    .execute(|| async { Err::<(), _>(io::Error::new(io::ErrorKind::Other, "down")) })
                    .await;
            }
        }
        registry.get("legal-data");

        let states = registry.list();
        assert_eq!(states.get("idp"), Some(&State::Open));
        assert_eq!(states.get("opa"), Some(&State::Open));
        assert_eq!(states.get("legal-data"), Some(&State::Closed));

        assert_eq!(registry.reset_all(), 3);
        assert!(registry.list().values().all(|s| *s == State::Closed));

        let names: Vec<_> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["idp", "legal-data", "opa"]);
    }
}
