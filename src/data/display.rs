//! Live status and latest-reading display.

use crate::experiment::{Observer, RunState};
use crate::measurement::{Phase, Sample, PLACEHOLDER};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Live {
    state: RunState,
    value: String,
    phase: Option<Phase>,
}

impl Default for Live {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            value: PLACEHOLDER.to_string(),
            phase: None,
        }
    }
}

/// Big-number display: last reading, its phase, and the run status.
#[derive(Clone, Default)]
pub struct LiveDisplay(Arc<Mutex<Live>>);

impl LiveDisplay {
    /// Display showing the placeholder and `Status: IDLE`.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Status: RUNNING` and friends.
    pub fn status_label(&self) -> String {
        format!("Status: {}", self.0.lock().state.label())
    }

    /// Last run state seen.
    pub fn state(&self) -> RunState {
        self.0.lock().state
    }

    /// Last formatted reading.
    pub fn live_value(&self) -> String {
        self.0.lock().value.clone()
    }

    /// Phase of the last reading.
    pub fn live_phase(&self) -> Option<Phase> {
        self.0.lock().phase
    }

    pub(crate) fn clear(&self) {
        let mut live = self.0.lock();
        live.value = PLACEHOLDER.to_string();
        live.phase = None;
    }
}

impl Observer for LiveDisplay {
    fn on_sample(&self, sample: &Sample) {
        let mut live = self.0.lock();
        live.value = sample.text.clone();
        live.phase = Some(sample.phase);
    }

    fn on_state_change(&self, state: RunState) {
        self.0.lock().state = state;
    }
}
