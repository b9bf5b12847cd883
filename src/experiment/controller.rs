//! Foreground run control: start, pause/resume, stop.
//!
//! The controller owns one engine and at most one [`RunHandle`]. Pause and stop
//! are no-ops when nothing is running; only `start` can fail.

use super::engine::{RunHandle, SequenceEngine};
use super::events::RunSummary;
use super::state::RunState;
use crate::error::StartError;
use crate::measurement::SequenceSpec;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Which run controls are usable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    /// Start button enabled
    pub can_start: bool,
    /// Pause/resume button enabled
    pub can_pause: bool,
    /// Caption of the pause/resume button
    pub pause_label: &'static str,
    /// Stop button enabled
    pub can_stop: bool,
}

/// Run Controller.
pub struct RunController {
    engine: Arc<SequenceEngine>,
    state: watch::Receiver<RunState>,
    current: Option<RunHandle>,
}

impl RunController {
    /// Controller driving `engine`.
    pub fn new(engine: Arc<SequenceEngine>) -> Self {
        let state = engine.subscribe_state();
        Self {
            engine,
            state,
            current: None,
        }
    }

    /// Engine under control.
    pub fn engine(&self) -> &Arc<SequenceEngine> {
        &self.engine
    }

    /// Current engine state.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Start a new run with a fresh cancellation token.
    pub fn start(&mut self, spec: SequenceSpec) -> Result<Uuid, StartError> {
        let handle = self.engine.start(spec)?;
        let run_id = handle.run_id();
        self.current = Some(handle);
        Ok(run_id)
    }

    /// Toggle pause on the active run.
    ///
    /// Returns the new pause intent, or `None` when no run is active.
    pub fn pause_or_resume(&self) -> Option<bool> {
        let handle = self.active()?;
        let paused = handle.token().toggle_pause();
        info!(paused, "Pause toggled");
        Some(paused)
    }

    /// Request the active run to stop. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        match self.active() {
            Some(handle) => {
                handle.stop();
                info!("Stop requested");
                true
            }
            None => false,
        }
    }

    /// Wait for the current run to finish and release its handle.
    pub async fn wait(&mut self) -> Option<RunSummary> {
        let handle = self.current.take()?;
        match handle.wait().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!(error = %e, "Run task failed");
                None
            }
        }
    }

    /// Wait until the engine reports `Completed`.
    ///
    /// Returns immediately when no run was started.
    pub async fn completed(&mut self) {
        if self.current.is_none() {
            return;
        }
        if self
            .state
            .wait_for(|s| *s == RunState::Completed)
            .await
            .is_err()
        {
            debug!("Engine dropped while waiting for completion");
        }
    }

    /// Control availability for the current state.
    pub fn affordances(&self) -> Affordances {
        let state = self.state();
        let pause_pending = self
            .active()
            .is_some_and(|handle| handle.token().is_pause_requested());
        let pausable = matches!(state, RunState::Running | RunState::Paused);
        Affordances {
            can_start: state.can_begin(),
            can_pause: pausable,
            pause_label: if state == RunState::Paused || pause_pending {
                "Resume"
            } else {
                "Pause"
            },
            can_stop: pausable,
        }
    }

    fn active(&self) -> Option<&RunHandle> {
        if matches!(self.state(), RunState::Running | RunState::Paused) {
            self.current.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::experiment::EngineOptions;
    use crate::measurement::{OrderMode, Phase, PhaseSpec};
    use std::time::Duration;

    fn controller() -> RunController {
        RunController::new(Arc::new(SequenceEngine::new(
            Arc::new(MockChannel::new()),
            EngineOptions::default(),
        )))
    }

    fn spec(cycles: u32) -> SequenceSpec {
        SequenceSpec::new(OrderMode::VoltageOnly, cycles)
            .with_phase(Phase::Voltage, PhaseSpec::from_secs(1.0, 0.5))
    }

    #[test]
    fn idle_controls_are_noops() {
        let ctl = controller();
        assert_eq!(ctl.pause_or_resume(), None);
        assert!(!ctl.stop());
        assert_eq!(ctl.state(), RunState::Idle);
        assert_eq!(
            ctl.affordances(),
            Affordances {
                can_start: true,
                can_pause: false,
                pause_label: "Pause",
                can_stop: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn affordances_follow_the_run() {
        let mut ctl = controller();
        ctl.start(spec(0)).unwrap();
        let running = ctl.affordances();
        assert!(!running.can_start);
        assert!(running.can_pause && running.can_stop);

        assert_eq!(ctl.pause_or_resume(), Some(true));
        assert_eq!(ctl.affordances().pause_label, "Resume");
        assert_eq!(ctl.pause_or_resume(), Some(false));

        assert!(ctl.stop());
        ctl.completed().await;
        let done = ctl.affordances();
        assert!(done.can_start);
        assert!(!done.can_pause && !done.can_stop);

        // Further stop/pause after completion do nothing.
        assert!(!ctl.stop());
        assert_eq!(ctl.pause_or_resume(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_completion_uses_fresh_token() {
        let mut ctl = controller();
        let first = ctl.start(spec(0)).unwrap();
        ctl.stop();
        let summary = ctl.wait().await.unwrap();
        assert_eq!(summary.run_id, first);

        let second = ctl.start(spec(1)).unwrap();
        assert_ne!(first, second);
        tokio::time::sleep(Duration::from_millis(600)).await;
        // A stale stop from the first run must not end the second one early.
        assert_eq!(ctl.state(), RunState::Running);
        let summary = ctl.wait().await.unwrap();
        assert_eq!(summary.samples, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_paused() {
        let mut ctl = controller();
        let mut state = ctl.engine().subscribe_state();
        let first = ctl.start(spec(0)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctl.pause_or_resume(), Some(true));
        state.wait_for(|s| *s == RunState::Paused).await.unwrap();
        assert!(matches!(
            ctl.start(spec(1)),
            Err(StartError::AlreadyRunning(RunState::Paused))
        ));

        assert_eq!(ctl.pause_or_resume(), Some(false));
        state.wait_for(|s| *s == RunState::Running).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        ctl.stop();
        let summary = ctl.wait().await.unwrap();
        assert_eq!(summary.run_id, first);
        assert!(summary.samples >= 3, "samples {}", summary.samples);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_running() {
        let mut ctl = controller();
        ctl.start(spec(0)).unwrap();
        assert!(matches!(
            ctl.start(spec(1)),
            Err(StartError::AlreadyRunning(RunState::Running))
        ));
        ctl.stop();
        ctl.wait().await.unwrap();
    }
}
