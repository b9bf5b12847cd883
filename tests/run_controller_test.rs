//! Foreground control scenarios: pause/resume/stop through the controller.

use ate_daq::channel::MockChannel;
use ate_daq::experiment::{
    CompletionReason, EngineOptions, RunController, RunState, SequenceEngine,
};
use ate_daq::measurement::{OrderMode, Phase, PhaseSpec, SequenceSpec};
use std::sync::Arc;
use std::time::Duration;

fn controller() -> RunController {
    let engine = SequenceEngine::new(
        Arc::new(MockChannel::constant(1.0)),
        EngineOptions::default(),
    );
    RunController::new(Arc::new(engine))
}

fn endless_voltage() -> SequenceSpec {
    SequenceSpec::new(OrderMode::VoltageOnly, 0)
        .with_phase(Phase::Voltage, PhaseSpec::from_secs(5.0, 0.5))
}

#[tokio::test(start_paused = true)]
async fn pause_and_stop_are_noops_without_a_run() {
    let mut controller = controller();

    assert_eq!(controller.pause_or_resume(), None);
    assert!(!controller.stop());
    assert!(controller.wait().await.is_none());
    controller.completed().await;

    let affordances = controller.affordances();
    assert!(affordances.can_start);
    assert!(!affordances.can_pause);
    assert!(!affordances.can_stop);
    assert_eq!(affordances.pause_label, "Pause");
    assert_eq!(controller.state(), RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn pause_resume_stop_cycle() {
    let mut controller = controller();
    let mut state = controller.engine().subscribe_state();

    controller.start(endless_voltage()).unwrap();
    assert!(!controller.affordances().can_start);
    assert!(controller.affordances().can_stop);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(controller.pause_or_resume(), Some(true));
    assert_eq!(controller.affordances().pause_label, "Resume");

    state.wait_for(|s| *s == RunState::Paused).await.unwrap();
    let paused = controller.affordances();
    assert!(paused.can_pause);
    assert!(paused.can_stop);
    assert_eq!(paused.pause_label, "Resume");

    assert_eq!(controller.pause_or_resume(), Some(false));
    state.wait_for(|s| *s == RunState::Running).await.unwrap();
    assert_eq!(controller.affordances().pause_label, "Pause");

    assert!(controller.stop());
    controller.completed().await;
    assert_eq!(controller.state(), RunState::Completed);

    let summary = controller.wait().await.unwrap();
    assert_eq!(summary.reason, CompletionReason::Stopped);
    assert!(controller.affordances().can_start);

    // Controls go quiet again once the run is over.
    assert_eq!(controller.pause_or_resume(), None);
    assert!(!controller.stop());
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_runs_to_completion() {
    let mut controller = controller();

    controller.start(endless_voltage()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.stop();
    controller.wait().await.unwrap();

    let spec = SequenceSpec::new(OrderMode::VoltageOnly, 1)
        .with_phase(Phase::Voltage, PhaseSpec::from_secs(1.0, 0.5));
    let run_id = controller.start(spec).unwrap();
    let summary = controller.wait().await.unwrap();
    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.reason, CompletionReason::Exhausted);
    assert_eq!(summary.samples, 2);
}
