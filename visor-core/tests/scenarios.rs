//! End-to-end scenarios from the specification's testable-properties
//! section, run against real child processes (`sleep`, `false`, `sh`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use visor_core::event_bus::{Event, EventBus, TOPIC_PROCESS_STATE};
use visor_core::{ChildConfig, ChildState, Supervisor, SupervisorConfig};

fn single_program(config: ChildConfig) -> SupervisorConfig {
    let mut programs = HashMap::new();
    programs.insert(config.name.clone(), config);
    SupervisorConfig::new(programs)
}

/// Scenario 1: happy start settles into Running with a real pid and the
/// expected `Stopped -> Starting -> Running` sequence on the bus.
#[tokio::test]
async fn happy_start_reaches_running() {
    let bus = Arc::new(EventBus::new());
    let (_id, mut events) = bus.connect(TOPIC_PROCESS_STATE);

    let config = ChildConfig::new("sleeper", vec!["sleep".into(), "10".into()])
        .with_start_secs(Duration::from_millis(300))
        .with_start_retries(0);
    let supervisor = Supervisor::new(single_program(config), bus);
    supervisor.start().await.expect("start");

    let mut seen = Vec::new();
    for _ in 0..3 {
        let Event::ProcessState { new, .. } = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event within timeout")
            .expect("event present")
        else {
            panic!("unexpected event kind");
        };
        seen.push(new);
        if new == ChildState::Running {
            break;
        }
    }
    assert_eq!(seen, vec![ChildState::Starting, ChildState::Running]);

    let info = supervisor.child("sleeper").unwrap().info();
    assert!(info.pid.unwrap_or(0) > 0);

    supervisor.stop().await.expect("stop");
}

/// Scenario 2: a command that exits immediately exhausts its retries and
/// lands on Fatal, with exactly `startRetries` Backoff transitions.
#[tokio::test]
async fn fails_to_stay_up_exhausts_retries_into_fatal() {
    let bus = Arc::new(EventBus::new());
    let (_id, mut events) = bus.connect(TOPIC_PROCESS_STATE);

    let config = ChildConfig::new("flaky", vec!["false".into()])
        .with_start_secs(Duration::from_millis(200))
        .with_start_retries(2);
    let supervisor = Supervisor::new(single_program(config), bus);
    supervisor.start().await.expect("start");

    let mut backoff_count = 0;
    loop {
        let Event::ProcessState { new, .. } = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .expect("event present")
        else {
            panic!("unexpected event kind");
        };
        if new == ChildState::Backoff {
            backoff_count += 1;
        }
        if new == ChildState::Fatal {
            break;
        }
    }
    assert_eq!(backoff_count, 2);
    assert_eq!(supervisor.child("flaky").unwrap().state(), ChildState::Fatal);
}

/// Scenario 3: stop() called mid-startup never lets the child reach
/// Running; it resolves straight to Stopped.
#[tokio::test]
async fn user_stop_during_startup_skips_running() {
    let bus = Arc::new(EventBus::new());
    let (_id, mut events) = bus.connect(TOPIC_PROCESS_STATE);

    let config = ChildConfig::new("slowup", vec!["sleep".into(), "5".into()])
        .with_start_secs(Duration::from_secs(3));
    let supervisor = Supervisor::new(single_program(config), bus);
    supervisor.start().await.expect("start");

    sleep(Duration::from_secs(1)).await;
    let child = supervisor.child("slowup").unwrap();
    child.stop().await.expect("stop");

    assert_eq!(child.state(), ChildState::Stopped);

    let mut saw_stopping = false;
    while let Ok(Some(Event::ProcessState { new, .. })) = timeout(Duration::from_millis(50), events.recv()).await {
        if new == ChildState::Running {
            panic!("child must not reach Running when stopped mid-startup");
        }
        if new == ChildState::Stopping {
            saw_stopping = true;
        }
    }
    assert!(saw_stopping);
}

/// Scenario 4: a child that ignores its stop signal is killed once the
/// grace period elapses.
#[tokio::test]
async fn grace_expiry_escalates_to_kill() {
    let bus = Arc::new(EventBus::new());
    let config = ChildConfig::new(
        "deaf",
        vec!["sh".into(), "-c".into(), "trap '' TERM; sleep 60".into()],
    )
    .with_start_secs(Duration::from_millis(200))
    .with_stop_wait_secs(Duration::from_millis(500));
    let supervisor = Supervisor::new(single_program(config), bus);
    supervisor.start().await.expect("start");

    let child = supervisor.child("deaf").unwrap();
    // Give it time to settle into Running before stopping.
    sleep(Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    child.stop().await.expect("stop");
    let elapsed = started.elapsed();

    assert_eq!(child.state(), ChildState::Stopped);
    assert!(elapsed < Duration::from_secs(2), "grace escalation took too long: {elapsed:?}");
}

/// Scenario 5: restarting a child resets its attempt counter — the first
/// attempt of the new run does not start in Backoff.
#[tokio::test]
async fn restart_resets_attempt_counter() {
    let bus = Arc::new(EventBus::new());
    let config = ChildConfig::new("sleeper", vec!["sleep".into(), "10".into()])
        .with_start_secs(Duration::from_millis(200));
    let supervisor = Supervisor::new(single_program(config), bus);

    supervisor.start().await.expect("start");
    sleep(Duration::from_millis(300)).await;
    supervisor.stop().await.expect("stop");
    assert_eq!(supervisor.child("sleeper").unwrap().state(), ChildState::Stopped);

    supervisor.child("sleeper").unwrap().start().await.expect("restart");
    sleep(Duration::from_millis(50)).await;
    assert_ne!(supervisor.child("sleeper").unwrap().state(), ChildState::Backoff);

    supervisor.stop().await.expect("stop");
}

/// Scenario 6: an unknown process name surfaces as a typed `NotFound`.
#[tokio::test]
async fn unknown_name_is_not_found() {
    let bus = Arc::new(EventBus::new());
    let supervisor = Supervisor::new(SupervisorConfig::new(HashMap::new()), bus);
    let err = supervisor
        .start_process("missing")
        .await
        .expect_err("missing child must error");
    assert!(err.is_not_found());
}

/// Idempotent-stop law: stopping an already-stopped child yields
/// `AlreadyStopped` and changes nothing.
#[tokio::test]
async fn idempotent_stop_on_already_stopped_child() {
    let bus = Arc::new(EventBus::new());
    let config = ChildConfig::new("sleeper", vec!["sleep".into(), "10".into()]);
    let supervisor = Supervisor::new(single_program(config), bus);
    let child = supervisor.child("sleeper").unwrap();

    let err = child.stop().await.expect_err("already stopped");
    assert!(err.is_already_stopped());
    assert_eq!(child.state(), ChildState::Stopped);
}
