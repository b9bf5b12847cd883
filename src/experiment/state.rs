//! Run lifecycle state.
//!
//! The sequence engine's background task is the only writer; everyone else
//! reads through a `tokio::sync::watch` receiver.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  start()  ┌─────────┐  stop() / exhausted  ┌──────────┐        ┌───────────┐
//! │ Idle │──────────▶│ Running │─────────────────────▶│ Stopping │───────▶│ Completed │
//! └──────┘           └────┬────┘                      └──────────┘        └─────┬─────┘
//!                    pause│  ▲resume                        ▲                   │
//!                         ▼  │                              │ stop()            │ start()
//!                     ┌────────┐                            │                   ▼
//!                     │ Paused │────────────────────────────┘               Running
//!                     └────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a sequence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No run has been started
    #[default]
    Idle,
    /// Sampling loop advancing
    Running,
    /// Sampling loop held at a tick boundary
    Paused,
    /// Stop observed, winding down
    Stopping,
    /// Run finished (stopped or exhausted)
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Paused => write!(f, "Paused"),
            RunState::Stopping => write!(f, "Stopping"),
            RunState::Completed => write!(f, "Completed"),
        }
    }
}

impl RunState {
    /// Check if the state allows starting a new run.
    pub fn can_begin(&self) -> bool {
        matches!(self, RunState::Idle | RunState::Completed)
    }

    /// Check if the state allows pausing.
    pub fn can_pause(&self) -> bool {
        matches!(self, RunState::Running)
    }

    /// Check if the state allows resuming.
    pub fn can_resume(&self) -> bool {
        matches!(self, RunState::Paused)
    }

    /// A background run exists (including one that is winding down).
    ///
    /// Channel I/O from the foreground and clearing collected data are
    /// refused while this holds.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused | RunState::Stopping)
    }

    /// Upper-case label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Stopping => "STOPPING",
            RunState::Completed => "COMPLETED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_only_from_rest() {
        assert!(RunState::Idle.can_begin());
        assert!(RunState::Completed.can_begin());
        assert!(!RunState::Running.can_begin());
        assert!(!RunState::Paused.can_begin());
        assert!(!RunState::Stopping.can_begin());
    }

    #[test]
    fn pause_resume_predicates() {
        assert!(RunState::Running.can_pause());
        assert!(!RunState::Paused.can_pause());
        assert!(RunState::Paused.can_resume());
        assert!(!RunState::Idle.can_resume());
    }

    #[test]
    fn activity() {
        let active: Vec<_> = [
            RunState::Idle,
            RunState::Running,
            RunState::Paused,
            RunState::Stopping,
            RunState::Completed,
        ]
        .into_iter()
        .filter(RunState::is_active)
        .collect();
        assert_eq!(
            active,
            vec![RunState::Running, RunState::Paused, RunState::Stopping]
        );
    }

    #[test]
    fn display_and_label() {
        assert_eq!(RunState::Paused.to_string(), "Paused");
        assert_eq!(RunState::Completed.label(), "COMPLETED");
    }
}
