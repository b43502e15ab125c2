//! Orchestrator behaviour with synthetic services.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ws_proxy::lifecycle::{Orchestrator, Phase, Registry, RunError, RunState};

mod common;
use common::{as_ref, Behaviour, MockService};

const LIMIT: Duration = Duration::from_secs(5);

fn registry(services: &[&Arc<MockService>]) -> Registry {
    let mut registry = Registry::new();
    for service in services {
        registry.add_shared(as_ref(service));
    }
    registry
}

#[tokio::test]
async fn test_empty_registry_returns_immediately() {
    let orchestrator = Orchestrator::new();
    let result = tokio::time::timeout(Duration::from_millis(100), orchestrator.run(Registry::new()))
        .await
        .expect("run must not block without services");

    assert!(result.is_ok());
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn test_trigger_stops_every_service() {
    let services: Vec<_> = ["a", "b", "c"].into_iter().map(MockService::blocking).collect();
    let orchestrator = Arc::new(Orchestrator::new());
    let handle = orchestrator.handle();

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&services.iter().collect::<Vec<_>>());
        async move { orchestrator.run(registry).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), RunState::Running);
    assert!(handle.trigger_shutdown());

    let result = tokio::time::timeout(LIMIT, run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(handle.state(), RunState::Done);
    for service in &services {
        assert_eq!(service.starts(), 1);
        assert_eq!(service.stops(), 1);
        assert!(service.stopped_at().is_some());
    }
}

#[tokio::test]
async fn test_start_failure_stops_others_and_wins() {
    let a = MockService::new("A", Behaviour::FailImmediately("bind refused")).shared();
    let b = MockService::blocking("B");
    let c = MockService::new("C", Behaviour::BlockUntilStopped)
        .with_stop_error("C stop failed")
        .shared();

    let orchestrator = Orchestrator::new();
    let result = tokio::time::timeout(LIMIT, orchestrator.run(registry(&[&a, &b, &c])))
        .await
        .expect("start failure must end the run");

    match result {
        Err(RunError::Start { service, source }) => {
            assert_eq!(service, "A");
            assert_eq!(source.to_string(), "bind refused");
        }
        other => panic!("expected A's start error, got {other:?}"),
    }
    assert_eq!(b.stops(), 1);
    assert_eq!(c.stops(), 1);
    // Every service is stopped, including the one that failed.
    assert_eq!(a.stops(), 1);
}

#[tokio::test]
async fn test_concurrent_triggers_fan_out_once() {
    let services: Vec<_> = ["a", "b"].into_iter().map(MockService::blocking).collect();
    let orchestrator = Arc::new(Orchestrator::new());

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&services.iter().collect::<Vec<_>>());
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = tokio::spawn({
        let handle = orchestrator.handle();
        async move { handle.trigger_shutdown() }
    });
    let second = tokio::spawn({
        let handle = orchestrator.handle();
        async move { handle.trigger_shutdown() }
    });
    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(first ^ second, "exactly one trigger must win");

    tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap();
    for service in &services {
        assert_eq!(service.stops(), 1);
    }
    assert!(!orchestrator.trigger_shutdown());
}

#[tokio::test]
async fn test_run_waits_for_slowest_stop() {
    let fast = MockService::new("fast", Behaviour::BlockUntilStopped)
        .with_stop_delay(Duration::from_millis(20))
        .shared();
    let slow = MockService::new("slow", Behaviour::BlockUntilStopped)
        .with_stop_delay(Duration::from_millis(200))
        .shared();

    let orchestrator = Arc::new(Orchestrator::new());
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&[&fast, &slow]);
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let triggered_at = Instant::now();
    orchestrator.trigger_shutdown();
    tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap();

    assert!(triggered_at.elapsed() >= Duration::from_millis(200));
    assert!(slow.stopped_at().unwrap() >= fast.stopped_at().unwrap());
}

#[tokio::test]
async fn test_all_starts_returning_ends_run() {
    let a = MockService::new("a", Behaviour::ReturnImmediately).shared();
    let b = MockService::new("b", Behaviour::ReturnImmediately).shared();

    let orchestrator = Orchestrator::new();
    tokio::time::timeout(LIMIT, orchestrator.run(registry(&[&a, &b])))
        .await
        .expect("run must end once every start returned")
        .unwrap();

    assert_eq!(a.stops(), 1);
    assert_eq!(b.stops(), 1);
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn test_panicking_start_is_reported() {
    let boom = MockService::new("boom", Behaviour::Panic).shared();
    let other = MockService::blocking("other");

    let orchestrator = Orchestrator::new();
    let err = tokio::time::timeout(LIMIT, orchestrator.run(registry(&[&boom, &other])))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Panicked { ref service, phase: Phase::Start } if service == "boom"
    ));
    assert_eq!(other.stops(), 1);
}

#[tokio::test]
async fn test_panicking_stop_is_reported() {
    let a = MockService::new("a", Behaviour::BlockUntilStopped)
        .with_stop_panic()
        .shared();
    let b = MockService::blocking("b");

    let orchestrator = Arc::new(Orchestrator::new());
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&[&a, &b]);
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.trigger_shutdown();

    let err = tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, RunError::Panicked { phase: Phase::Stop, .. }));
    assert_eq!(b.stops(), 1);
}

#[tokio::test]
async fn test_stop_error_without_start_error() {
    let a = MockService::new("a", Behaviour::BlockUntilStopped)
        .with_stop_error("flush failed")
        .shared();

    let orchestrator = Arc::new(Orchestrator::new());
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&[&a]);
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.trigger_shutdown();

    let err = tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.to_string(), "service `a` failed to stop: flush failed");
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let a = MockService::new("a", Behaviour::ReturnImmediately).shared();
    let orchestrator = Orchestrator::new();
    orchestrator.run(registry(&[&a])).await.unwrap();

    let b = MockService::new("b", Behaviour::ReturnImmediately).shared();
    let err = orchestrator.run(registry(&[&b])).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRan));
    assert_eq!(b.starts(), 0);
    assert_eq!(b.stops(), 0);
}

#[tokio::test]
async fn test_trigger_before_run_skips_services() {
    let a = MockService::blocking("a");
    let orchestrator = Orchestrator::new();
    assert!(orchestrator.trigger_shutdown());

    tokio::time::timeout(LIMIT, orchestrator.run(registry(&[&a])))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.starts(), 0);
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn test_shutdown_timeout_reports_stuck_services() {
    let stuck = MockService::new("stuck", Behaviour::Hang).shared();
    let fine = MockService::blocking("fine");

    let orchestrator = Arc::new(Orchestrator::new().with_shutdown_timeout(Duration::from_millis(100)));
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&[&stuck, &fine]);
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.trigger_shutdown();

    let err = tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap_err();
    match err {
        RunError::GraceExceeded { grace, stuck: names } => {
            assert_eq!(grace, Duration::from_millis(100));
            assert_eq!(names, vec!["stuck".to_string()]);
        }
        other => panic!("expected GraceExceeded, got {other:?}"),
    }
    assert_eq!(stuck.stops(), 1);
}

#[tokio::test]
async fn test_signal_bridge_triggers_shutdown() {
    use ws_proxy::lifecycle::SignalBridge;

    let a = MockService::blocking("a");
    let orchestrator = Arc::new(Orchestrator::new());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let _bridge = SignalBridge::spawn_with(orchestrator.handle(), async move {
        let _ = rx.await;
        Ok("SIGTERM")
    });

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let registry = registry(&[&a]);
        async move { orchestrator.run(registry).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(LIMIT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(a.stops(), 1);
}
