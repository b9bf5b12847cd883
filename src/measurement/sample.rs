//! One acquisition event.

use super::format::format_reading;
use super::phase::Phase;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single timestamped reading.
///
/// Created by the sequence engine and never mutated afterwards; observers
/// receive it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock acquisition time
    pub timestamp: DateTime<Local>,
    /// Monotonic time since the run started
    pub elapsed: Duration,
    /// Zero-based cycle index
    pub cycle: u32,
    /// Phase the reading belongs to
    pub phase: Phase,
    /// Raw reading in base units; NaN when the read failed
    pub value: f64,
    /// Human-scaled rendering of `value`
    pub text: String,
}

impl Sample {
    /// Build a sample, rendering `value` for `phase`.
    pub fn new(phase: Phase, value: f64, cycle: u32, elapsed: Duration) -> Self {
        Self {
            timestamp: Local::now(),
            elapsed,
            cycle,
            phase,
            value,
            text: format_reading(value, phase),
        }
    }

    /// `HH:MM:SS` timestamp used by records and exports.
    pub fn clock_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    /// `true` when the underlying read failed.
    pub fn is_missing(&self) -> bool {
        self.value.is_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::format::PLACEHOLDER;

    #[test]
    fn failed_read_renders_placeholder() {
        let sample = Sample::new(Phase::Current, f64::NAN, 0, Duration::ZERO);
        assert!(sample.is_missing());
        assert_eq!(sample.text, PLACEHOLDER);
    }

    #[test]
    fn clock_time_shape() {
        let sample = Sample::new(Phase::Voltage, 1.0, 2, Duration::from_secs(3));
        let clock = sample.clock_time();
        assert_eq!(clock.len(), 8);
        assert_eq!(clock.matches(':').count(), 2);
        assert_eq!(sample.text, "1.000 V");
    }
}
