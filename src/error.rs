//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire application,
//! together with the two narrower error types that cross component seams:
//!
//! - **`ChannelError`**: Raised by a [`MeasurementChannel`](crate::channel::MeasurementChannel)
//!   when an instrument call times out, the transport faults, or the response cannot be
//!   parsed. The sequence engine never propagates these; it logs them and continues with a
//!   degraded value.
//! - **`StartError`**: The only hard error the sequence engine returns. A start request is
//!   rejected when a run is already active or when the requested sequence is unusable.
//!
//! `DaqError` consolidates everything the application surface can fail with:
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches.
//! - **`Configuration`**: Semantic errors in values that parsed correctly.
//! - **`Io`**: Wraps standard `std::io::Error`.
//! - **`Channel`** / **`Start`**: The seam errors above, lifted with `#[from]`.
//! - **`Storage`**: CSV export or log save failures.
//! - **`Busy`**: An operation that is only safe between runs was attempted mid-run.
//! - **`FeatureNotEnabled`**: Functionality that was compiled out via feature flags.

use crate::experiment::RunState;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Failure of a single instrument call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Instrument did not answer '{command}' within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Transport fault: {0}")]
    Transport(String),

    #[error("Malformed response to '{command}': {response:?}")]
    MalformedResponse { command: String, response: String },

    #[error("Instrument not connected")]
    NotConnected,
}

impl ChannelError {
    /// Wrap any transport-level error, keeping its context chain.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

/// Rejection of a start request. Leaves the engine untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    #[error("A run is already active (state: {0})")]
    AlreadyRunning(RunState),

    #[error("Invalid sequence: {0}")]
    InvalidSpec(String),
}

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Cannot start run: {0}")]
    Start(#[from] StartError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation not allowed while run is {0}")]
    Busy(RunState),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_lifts_into_app_error() {
        let err: DaqError = StartError::AlreadyRunning(RunState::Paused).into();
        assert!(matches!(
            err,
            DaqError::Start(StartError::AlreadyRunning(RunState::Paused))
        ));
        assert!(err.to_string().contains("Paused"));
    }

    #[test]
    fn channel_timeout_message_names_command() {
        let err = ChannelError::Timeout {
            command: "print(dmm.measure.read())".into(),
            after: Duration::from_millis(5000),
        };
        let msg = err.to_string();
        assert!(msg.contains("dmm.measure.read"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn busy_reports_state() {
        let err = DaqError::Busy(RunState::Running);
        assert_eq!(err.to_string(), "Operation not allowed while run is Running");
    }
}
