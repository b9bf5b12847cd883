//! Phase tags and the immutable per-run sequence description.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::time::Duration;

/// Fallback cycle count when the entry cannot be parsed.
pub const DEFAULT_CYCLES: u32 = 1;
/// Fallback phase duration in seconds.
pub const DEFAULT_DURATION_SECS: f64 = 5.0;
/// Fallback sampling interval in seconds.
pub const DEFAULT_INTERVAL_SECS: f64 = 0.5;

/// Measured quantity of an acquisition phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// DC voltage
    Voltage,
    /// DC current
    Current,
}

impl Phase {
    /// Both phases in their natural order.
    pub const ALL: [Phase; 2] = [Phase::Voltage, Phase::Current];

    /// Upper-case tag used in records and exports.
    pub fn tag(&self) -> &'static str {
        match self {
            Phase::Voltage => "VOLTAGE",
            Phase::Current => "CURRENT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

/// Order in which phases run inside one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderMode {
    /// Voltage, then current
    #[default]
    VoltageThenCurrent,
    /// Current, then voltage
    CurrentThenVoltage,
    /// Same phase list as `VoltageThenCurrent`; cycles provide the alternation.
    Alternating,
    /// Voltage phase only
    VoltageOnly,
    /// Current phase only
    CurrentOnly,
}

impl OrderMode {
    /// Phases executed per cycle, in order. Excluded phases never appear.
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            OrderMode::VoltageThenCurrent | OrderMode::Alternating => {
                &[Phase::Voltage, Phase::Current]
            }
            OrderMode::CurrentThenVoltage => &[Phase::Current, Phase::Voltage],
            OrderMode::VoltageOnly => &[Phase::Voltage],
            OrderMode::CurrentOnly => &[Phase::Current],
        }
    }

    /// Whether `phase` takes part in a cycle.
    pub fn includes(&self, phase: Phase) -> bool {
        self.phases().contains(&phase)
    }

    /// Parse the control-panel token (`V->I`, `I->V`, `Alternating`, `V only`, `I only`).
    ///
    /// Variant names are accepted too. Unknown tokens fall back to `VoltageThenCurrent`.
    pub fn from_token(token: &str) -> Self {
        Self::parse_token(token).unwrap_or_default()
    }

    /// Strict form of [`OrderMode::from_token`]: `None` for unknown tokens.
    pub fn parse_token(token: &str) -> Option<Self> {
        let normalized: String = token
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();
        match normalized.as_str() {
            "v->i" | "voltagethencurrent" => Some(OrderMode::VoltageThenCurrent),
            "i->v" | "currentthenvoltage" => Some(OrderMode::CurrentThenVoltage),
            "alternating" => Some(OrderMode::Alternating),
            "vonly" | "voltageonly" => Some(OrderMode::VoltageOnly),
            "ionly" | "currentonly" => Some(OrderMode::CurrentOnly),
            _ => None,
        }
    }

    /// Control-panel token for this mode.
    pub fn token(&self) -> &'static str {
        match self {
            OrderMode::VoltageThenCurrent => "V->I",
            OrderMode::CurrentThenVoltage => "I->V",
            OrderMode::Alternating => "Alternating",
            OrderMode::VoltageOnly => "V only",
            OrderMode::CurrentOnly => "I only",
        }
    }
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.token())
    }
}

/// Timing and range settings of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase length
    pub duration: Duration,
    /// Delay between samples
    pub interval: Duration,
    /// Range token as shown in the selector (`Auto`, `1V`, `10mA`, ...)
    pub range: String,
    /// Instrument autorange flag; overrides any fixed range when set
    pub autorange: bool,
}

impl Default for PhaseSpec {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs_f64(DEFAULT_DURATION_SECS),
            interval: Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
            range: "Auto".to_string(),
            autorange: true,
        }
    }
}

impl PhaseSpec {
    /// Build from seconds.
    pub fn from_secs(duration_s: f64, interval_s: f64) -> Self {
        Self {
            duration: secs_or(duration_s, DEFAULT_DURATION_SECS),
            interval: secs_or(interval_s, DEFAULT_INTERVAL_SECS),
            ..Default::default()
        }
    }

    /// Set the range token.
    pub fn with_range(mut self, token: impl Into<String>) -> Self {
        self.range = token.into();
        self
    }

    /// Set the autorange flag.
    pub fn with_autorange(mut self, autorange: bool) -> Self {
        self.autorange = autorange;
        self
    }

    fn validate(&self, phase: Phase) -> Result<(), String> {
        if self.duration.is_zero() {
            return Err(format!("{} duration must be > 0", phase));
        }
        if self.interval.is_zero() {
            return Err(format!("{} interval must be > 0", phase));
        }
        Ok(())
    }
}

fn secs_or(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

/// Per-phase settings indexed by [`Phase`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseSpecs {
    /// Voltage phase settings
    pub voltage: PhaseSpec,
    /// Current phase settings
    pub current: PhaseSpec,
}

impl Index<Phase> for PhaseSpecs {
    type Output = PhaseSpec;

    fn index(&self, phase: Phase) -> &PhaseSpec {
        match phase {
            Phase::Voltage => &self.voltage,
            Phase::Current => &self.current,
        }
    }
}

impl IndexMut<Phase> for PhaseSpecs {
    fn index_mut(&mut self, phase: Phase) -> &mut PhaseSpec {
        match phase {
            Phase::Voltage => &mut self.voltage,
            Phase::Current => &mut self.current,
        }
    }
}

/// Immutable description of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
    /// Phase ordering inside a cycle
    pub order: OrderMode,
    /// Number of cycles; `0` runs until stopped
    pub cycles: u32,
    /// Per-phase settings
    pub phases: PhaseSpecs,
}

impl Default for SequenceSpec {
    fn default() -> Self {
        Self::new(OrderMode::default(), DEFAULT_CYCLES)
    }
}

impl SequenceSpec {
    /// Create a spec with default phase settings.
    pub fn new(order: OrderMode, cycles: u32) -> Self {
        Self {
            order,
            cycles,
            phases: PhaseSpecs::default(),
        }
    }

    /// Replace the settings of one phase.
    pub fn with_phase(mut self, phase: Phase, spec: PhaseSpec) -> Self {
        self.phases[phase] = spec;
        self
    }

    /// Settings of `phase`.
    pub fn phase(&self, phase: Phase) -> &PhaseSpec {
        &self.phases[phase]
    }

    /// `true` when the run only ends on an explicit stop.
    pub fn is_unbounded(&self) -> bool {
        self.cycles == 0
    }

    /// Check the phases that will actually run.
    pub fn validate(&self) -> Result<(), String> {
        for &phase in self.order.phases() {
            self.phases[phase].validate(phase)?;
        }
        Ok(())
    }

    /// Build from the raw text entries of a control panel.
    ///
    /// Every numeric entry falls back to its documented default when it does not parse
    /// or is not positive, matching the form's lenient behavior.
    pub fn from_entries(
        order: &str,
        cycles: &str,
        voltage: PhaseEntries<'_>,
        current: PhaseEntries<'_>,
    ) -> Self {
        let cycles = cycles.trim().parse::<u32>().unwrap_or(DEFAULT_CYCLES);
        Self {
            order: OrderMode::from_token(order),
            cycles,
            phases: PhaseSpecs {
                voltage: voltage.into_spec(),
                current: current.into_spec(),
            },
        }
    }
}

/// Raw text entries for one phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseEntries<'a> {
    /// Duration entry (seconds)
    pub duration: &'a str,
    /// Interval entry (seconds)
    pub interval: &'a str,
    /// Range selector token
    pub range: &'a str,
    /// Autorange checkbox
    pub autorange: bool,
}

impl PhaseEntries<'_> {
    fn into_spec(self) -> PhaseSpec {
        let duration = parse_positive(self.duration).unwrap_or(DEFAULT_DURATION_SECS);
        let interval = parse_positive(self.interval).unwrap_or(DEFAULT_INTERVAL_SECS);
        PhaseSpec::from_secs(duration, interval)
            .with_range(self.range.trim())
            .with_autorange(self.autorange)
    }
}

fn parse_positive(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_table() {
        assert_eq!(
            OrderMode::VoltageThenCurrent.phases(),
            &[Phase::Voltage, Phase::Current]
        );
        assert_eq!(
            OrderMode::CurrentThenVoltage.phases(),
            &[Phase::Current, Phase::Voltage]
        );
        assert_eq!(
            OrderMode::Alternating.phases(),
            OrderMode::VoltageThenCurrent.phases()
        );
        assert_eq!(OrderMode::VoltageOnly.phases(), &[Phase::Voltage]);
        assert_eq!(OrderMode::CurrentOnly.phases(), &[Phase::Current]);
        assert!(!OrderMode::VoltageOnly.includes(Phase::Current));
    }

    #[test]
    fn order_tokens_round_trip() {
        for mode in [
            OrderMode::VoltageThenCurrent,
            OrderMode::CurrentThenVoltage,
            OrderMode::Alternating,
            OrderMode::VoltageOnly,
            OrderMode::CurrentOnly,
        ] {
            assert_eq!(OrderMode::from_token(mode.token()), mode);
        }
        assert_eq!(OrderMode::from_token("i ONLY"), OrderMode::CurrentOnly);
        assert_eq!(OrderMode::from_token("sideways"), OrderMode::VoltageThenCurrent);
    }

    #[test]
    fn entries_fall_back_on_garbage() {
        let bad = PhaseEntries {
            duration: "abc",
            interval: "-1",
            range: " 1V ",
            autorange: false,
        };
        let spec = SequenceSpec::from_entries("V only", "x", bad, bad);
        assert_eq!(spec.cycles, DEFAULT_CYCLES);
        assert_eq!(spec.order, OrderMode::VoltageOnly);
        assert_eq!(spec.phases.voltage.duration, Duration::from_secs(5));
        assert_eq!(spec.phases.voltage.interval, Duration::from_millis(500));
        assert_eq!(spec.phases.voltage.range, "1V");
        assert!(!spec.phases.voltage.autorange);
    }

    #[test]
    fn zero_cycles_means_unbounded() {
        let entries = PhaseEntries {
            duration: "1",
            interval: "0.25",
            range: "Auto",
            autorange: true,
        };
        let spec = SequenceSpec::from_entries("V->I", "0", entries, entries);
        assert!(spec.is_unbounded());
        assert_eq!(spec.phases.current.interval, Duration::from_millis(250));
    }

    #[test]
    fn validation_only_checks_running_phases() {
        let mut spec = SequenceSpec::new(OrderMode::VoltageOnly, 1);
        spec.phases.current.interval = Duration::ZERO;
        assert!(spec.validate().is_ok());

        spec.order = OrderMode::CurrentOnly;
        let err = spec.validate().unwrap_err();
        assert!(err.contains("CURRENT interval"));
    }

    #[test]
    fn phase_index_by_tag() {
        let spec = SequenceSpec::default()
            .with_phase(Phase::Current, PhaseSpec::from_secs(2.0, 0.1).with_range("10mA"));
        assert_eq!(spec.phase(Phase::Current).range, "10mA");
        assert_eq!(spec.phase(Phase::Voltage).range, "Auto");
    }
}
