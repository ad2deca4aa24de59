//! Behavioural tests covering daemon launch and shutdown.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::process::LaunchError;

use super::support::{HealthEvent, ProcessWorld};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<ProcessWorld> {
    RefCell::new(ProcessWorld::new())
}

#[given("a fresh daemon process world")]
fn given_world(world: &RefCell<ProcessWorld>) {
    let _ = world;
}

#[when("the daemon runs while a client leaves {count} sessions open")]
fn when_daemon_runs(world: &RefCell<ProcessWorld>, count: usize) -> StepResult {
    world.borrow_mut().run_with_client(count)
}

#[when("the daemon runs with an invalid configuration")]
fn when_daemon_runs_invalid(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow_mut().run_with_invalid_config()
}

#[then("the daemon run succeeds")]
fn then_run_succeeds(world: &RefCell<ProcessWorld>) {
    let world = world.borrow();
    let result = world.last_result().expect("expected a recorded daemon result");
    assert!(result.is_ok(), "daemon run should succeed: {result:?}");
}

#[then("the daemon run fails during bootstrap")]
fn then_run_fails(world: &RefCell<ProcessWorld>) {
    let world = world.borrow();
    let result = world.last_result().expect("expected a recorded daemon result");
    assert!(
        matches!(result, Err(LaunchError::Bootstrap { .. })),
        "unexpected result: {result:?}"
    );
}

#[then("the scripted client finished cleanly")]
fn then_client_clean(world: &RefCell<ProcessWorld>) -> StepResult {
    match world.borrow().client_error() {
        None => Ok(()),
        Some(error) => Err(format!("client failed: {error}")),
    }
}

#[then("the reporter saw the listener start and stop")]
fn then_listener_lifecycle(world: &RefCell<ProcessWorld>) {
    let events = world.borrow().reporter.events();
    let started = events
        .iter()
        .position(|event| matches!(event, HealthEvent::ListenerStarted(_)));
    let stopped = events
        .iter()
        .position(|event| *event == HealthEvent::ListenerStopped);
    match (started, stopped) {
        (Some(started), Some(stopped)) => assert!(started < stopped, "events: {events:?}"),
        _ => panic!("listener lifecycle events missing: {events:?}"),
    }
}

#[then("the reporter saw {count} sessions drained")]
fn then_sessions_drained(world: &RefCell<ProcessWorld>, count: usize) {
    let events = world.borrow().reporter.events();
    assert_eq!(
        events.last(),
        Some(&HealthEvent::SessionsDrained {
            closed: count,
            failed: 0
        }),
        "events: {events:?}"
    );
}

#[then("the reporter saw no listener start")]
fn then_no_listener(world: &RefCell<ProcessWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, HealthEvent::ListenerStarted(_))),
        "listener started unexpectedly: {events:?}"
    );
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_))),
        "bootstrap failure missing: {events:?}"
    );
}

#[then("the daemon socket was removed")]
fn then_socket_removed(world: &RefCell<ProcessWorld>) {
    let path = world.borrow().socket_path();
    assert!(!path.exists(), "socket {} still exists", path.display());
}

#[scenario(
    path = "tests/features/daemon_process.feature",
    name = "Shutdown drains sessions left open by clients"
)]
fn shutdown_drains_sessions(world: RefCell<ProcessWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/daemon_process.feature",
    name = "Configuration failures abort the launch"
)]
fn configuration_failures_abort(world: RefCell<ProcessWorld>) {
    drop(world);
}
