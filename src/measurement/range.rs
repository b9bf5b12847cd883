//! Range selector tokens to instrument range values.
//!
//! Resolution never fails: `auto` in any casing selects autoranging, a known
//! token maps through the phase table, and anything else falls back to the
//! phase default.

use super::phase::Phase;
use std::fmt;

/// Range used when a voltage token is not recognized (volts).
pub const DEFAULT_VOLTAGE_RANGE: f64 = 10.0;
/// Range used when a current token is not recognized (amperes).
pub const DEFAULT_CURRENT_RANGE: f64 = 1.0;

const VOLTAGE_RANGES: &[(&str, f64)] = &[("100mV", 0.1), ("1V", 1.0), ("3V", 3.0), ("10V", 10.0)];

const CURRENT_RANGES: &[(&str, f64)] = &[
    ("10μA", 10e-6),
    ("100μA", 100e-6),
    ("1mA", 1e-3),
    ("10mA", 10e-3),
    ("100mA", 0.1),
    ("1A", 1.0),
    ("3A", 3.0),
];

/// Resolved instrument range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeValue {
    /// Let the instrument pick the range
    Auto,
    /// Fixed full-scale range in base units
    Fixed(f64),
}

impl RangeValue {
    /// `true` for the autorange sentinel.
    pub fn is_auto(&self) -> bool {
        matches!(self, RangeValue::Auto)
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeValue::Auto => f.write_str("Auto"),
            RangeValue::Fixed(v) => write!(f, "{}", v),
        }
    }
}

/// Selector tokens offered for `phase`, `Auto` first.
pub fn range_tokens(phase: Phase) -> Vec<&'static str> {
    std::iter::once("Auto")
        .chain(table(phase).iter().map(|(token, _)| *token))
        .collect()
}

fn table(phase: Phase) -> &'static [(&'static str, f64)] {
    match phase {
        Phase::Voltage => VOLTAGE_RANGES,
        Phase::Current => CURRENT_RANGES,
    }
}

fn default_range(phase: Phase) -> f64 {
    match phase {
        Phase::Voltage => DEFAULT_VOLTAGE_RANGE,
        Phase::Current => DEFAULT_CURRENT_RANGE,
    }
}

/// Map a selector token to a range for `phase`.
pub fn resolve_range(token: &str, phase: Phase) -> RangeValue {
    let token = token.trim();
    if token.eq_ignore_ascii_case("auto") {
        return RangeValue::Auto;
    }
    // micro sign and ASCII 'u' are accepted for the Greek mu used in the table
    let normalized = token.replace(['µ', 'u'], "μ");
    let value = table(phase)
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, value)| *value);
    match value {
        Some(v) => RangeValue::Fixed(v),
        None => {
            tracing::debug!(token = %token, phase = %phase, "Unknown range token, using default");
            RangeValue::Fixed(default_range(phase))
        }
    }
}
