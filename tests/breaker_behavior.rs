//! Behavioural tests for a single breaker, driven on a paused clock.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use circuit_guard::resilience::consecutive_failures;
use circuit_guard::{BreakerError, CircuitBreaker, ExecuteError, Registry, Settings, State};
use tokio::sync::oneshot;

fn down() -> Result<(), io::Error> {
    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "dependency down"))
}

fn breaker(max_requests: u32, timeout: Duration) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "legal-data",
        Settings::new()
            .with_max_requests(max_requests)
            .with_timeout(timeout)
            .with_trip_predicate(consecutive_failures(1)),
    ))
}

/// Admit a call that stays in flight until the returned sender fires.
async fn gated_call(
    cb: &Arc<CircuitBreaker>,
    succeed: bool,
) -> (
    oneshot::Sender<()>,
    tokio::task::JoinHandle<Result<(), ExecuteError<io::Error>>>,
) {
    let (release, gate) = oneshot::channel::<()>();
    let before = cb.in_flight();
    let cb2 = Arc::clone(cb);
    let handle = tokio::spawn(async move {
        cb2.execute(move || async move {
            let _ = gate.await;
            if succeed {
                Ok(())
            } else {
                down()
            }
        })
        .await
    });
    while cb.in_flight() == before {
        tokio::task::yield_now().await;
    }
    (release, handle)
}

#[tokio::test(start_paused = true)]
async fn test_registry_default_trips_after_three_failures() {
    let registry = Registry::default();
    let cb = registry.get("legal-data");

    for _ in 0..3 {
        let result = cb.execute(|| async { down() }).await;
        assert!(matches!(result, Err(ExecuteError::Call(_))));
    }
    assert_eq!(cb.state(), State::Open);

    let result = cb.execute(|| async { Ok::<_, io::Error>(()) }).await;
    match result {
        Err(ExecuteError::Rejected(BreakerError::OpenState { name, state, remaining })) => {
            assert_eq!(name, "legal-data");
            assert_eq!(state, State::Open);
            assert_eq!(remaining, Duration::from_secs(30));
        }
        other => panic!("expected OpenState, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_closed_breaker_keeps_calling_while_predicate_is_false() {
    let cb = CircuitBreaker::new("idp", Settings::new());
    let calls = Arc::new(AtomicU32::new(0));

    for i in 0..20 {
        let seen = Arc::clone(&calls);
        let _ = cb
            .execute(move || async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if i % 2 == 0 {
                    down()
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(cb.state(), State::Closed);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(cb.counts().requests, 20);
    assert_eq!(cb.counts().total_failures, 10);
}

#[tokio::test(start_paused = true)]
async fn test_probe_after_timeout_closes_breaker() {
    let cb = breaker(1, Duration::from_millis(100));
    let _ = cb.execute(|| async { down() }).await;
    assert_eq!(cb.state(), State::Open);

    tokio::time::advance(Duration::from_millis(50)).await;
    let early = cb.execute(|| async { Ok::<_, io::Error>(()) }).await;
    assert!(early.unwrap_err().is_rejection());

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(cb.state(), State::HalfOpen);

    cb.execute(|| async { Ok::<_, io::Error>(()) }).await.unwrap();
    assert_eq!(cb.state(), State::Closed);
    assert_eq!(cb.counts().requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_quota_rejects_excess_probes() {
    let cb = breaker(2, Duration::from_millis(100));
    let _ = cb.execute(|| async { down() }).await;
    tokio::time::advance(Duration::from_millis(150)).await;

    let (first_release, first) = gated_call(&cb, true).await;
    let (second_release, second) = gated_call(&cb, true).await;
    assert_eq!(cb.state(), State::HalfOpen);
    assert_eq!(cb.counts().requests, 2);

    let third = cb.execute(|| async { Ok::<_, io::Error>(()) }).await;
    match third {
        Err(ExecuteError::Rejected(BreakerError::TooManyRequests { state, .. })) => {
            assert_eq!(state, State::HalfOpen)
        }
        other => panic!("expected TooManyRequests, got {other:?}"),
    }

    first_release.send(()).unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(cb.state(), State::HalfOpen);

    second_release.send(()).unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(cb.state(), State::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_single_half_open_failure_reopens() {
    let cb = breaker(3, Duration::from_millis(100));
    let _ = cb.execute(|| async { down() }).await;
    tokio::time::advance(Duration::from_millis(100)).await;

    cb.execute(|| async { Ok::<_, io::Error>(()) }).await.unwrap();
    assert_eq!(cb.counts().consecutive_successes, 1);

    let _ = cb.execute(|| async { down() }).await;
    assert_eq!(cb.state(), State::Open);
    assert_eq!(cb.counts().total_successes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_outcome_does_not_touch_new_generation() {
    let cb = breaker(1, Duration::from_secs(60));

    let (release, pending) = gated_call(&cb, false).await;
    let admitted_in = cb.generation();

    cb.reset();
    assert!(cb.generation() > admitted_in);

    release.send(()).unwrap();
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ExecuteError::Call(_))));

    assert_eq!(cb.state(), State::Closed);
    assert_eq!(cb.counts().total_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_panic_is_recorded_then_resumed() {
    let cb = breaker(1, Duration::from_secs(60));

    let task_cb = Arc::clone(&cb);
    let outcome = tokio::spawn(async move {
        let _ = task_cb
            .execute(|| async {
                if true {
                    panic!("protected call exploded");
                }
                Ok::<(), io::Error>(())
            })
            .await;
    })
    .await;

    let err = outcome.unwrap_err();
    assert!(err.is_panic());
    let payload = err.into_panic();
    assert_eq!(
        payload.downcast_ref::<&str>(),
        Some(&"protected call exploded")
    );
    assert_eq!(cb.state(), State::Open);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_counts_as_failure() {
    let cb = breaker(1, Duration::from_secs(60));
    let (cancel, cancelled) = oneshot::channel::<()>();

    let calls = tokio::spawn({
        let cb = Arc::clone(&cb);
        async move {
            cb.execute_until(cancelled, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, io::Error>(())
            })
            .await
        }
    });
    while cb.in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    cancel.send(()).unwrap();

    let result = calls.await.unwrap();
    assert!(matches!(result, Err(ExecuteError::Cancelled { .. })));
    assert_eq!(cb.state(), State::Open);
    assert_eq!(cb.orphaned_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_every_transition() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let cb = CircuitBreaker::new(
        "opa",
        Settings::new()
            .with_timeout(Duration::from_millis(100))
            .with_trip_predicate(consecutive_failures(1))
            .with_observer(move |name: &str, from: State, to: State| {
                log.lock().unwrap().push((name.to_string(), from, to));
            }),
    );

    let _ = cb.execute(|| async { down() }).await;
    tokio::time::advance(Duration::from_millis(100)).await;
    cb.execute(|| async { Ok::<_, io::Error>(()) }).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("opa".to_string(), State::Closed, State::Open),
            ("opa".to_string(), State::Open, State::HalfOpen),
            ("opa".to_string(), State::HalfOpen, State::Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_observer_does_not_break_the_breaker() {
    let cb = CircuitBreaker::new(
        "opa",
        Settings::new()
            .with_trip_predicate(consecutive_failures(1))
            .with_observer(|_: &str, _: State, _: State| panic!("observer bug")),
    );

    let result = cb.execute(|| async { down() }).await;
    assert!(matches!(result, Err(ExecuteError::Call(_))));
    assert_eq!(cb.state(), State::Open);

    cb.reset();
    assert_eq!(cb.state(), State::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_half_open_probe_frees_the_probe_slot() {
    let cb = breaker(1, Duration::from_millis(100));
    let _ = cb.execute(|| async { down() }).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let gave_up = tokio::time::timeout(
        Duration::from_millis(10),
        cb.execute(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, io::Error>(())
        }),
    )
    .await;
    assert!(gave_up.is_err());
    assert_eq!(cb.state(), State::Open);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(cb.state(), State::HalfOpen);
    assert_eq!(cb.orphaned_calls(), 0);

    cb.execute(|| async { Ok::<_, io::Error>(()) }).await.unwrap();
    assert_eq!(cb.state(), State::Closed);
}
