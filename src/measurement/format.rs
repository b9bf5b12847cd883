//! Human-scaled rendering of raw readings.
//!
//! Readings are shown with three decimals and an SI-prefixed unit chosen by
//! magnitude. A failed read (NaN) renders as [`PLACEHOLDER`].

use super::phase::Phase;

/// Text shown for a reading that could not be acquired.
pub const PLACEHOLDER: &str = "---";

/// (threshold, scale, unit): the first row whose threshold exceeds `|v|` wins.
const VOLTAGE_UNITS: &[(f64, f64, &str)] = &[(1e-3, 1e6, "μV"), (1.0, 1e3, "mV")];
const CURRENT_UNITS: &[(f64, f64, &str)] =
    &[(1e-6, 1e9, "nA"), (1e-3, 1e6, "μA"), (1.0, 1e3, "mA")];

fn unit_table(phase: Phase) -> (&'static [(f64, f64, &'static str)], &'static str) {
    match phase {
        Phase::Voltage => (VOLTAGE_UNITS, "V"),
        Phase::Current => (CURRENT_UNITS, "A"),
    }
}

/// Render `value` for display, e.g. `0.0005` V as `500.000 μV`.
pub fn format_reading(value: f64, phase: Phase) -> String {
    if value.is_nan() {
        return PLACEHOLDER.to_string();
    }
    let (table, base) = unit_table(phase);
    let magnitude = value.abs();
    for &(threshold, scale, unit) in table {
        if magnitude < threshold {
            return format!("{:.3} {}", value * scale, unit);
        }
    }
    format!("{:.3} {}", value, base)
}

/// Leading numeric token of a formatted reading, in display units.
///
/// Returns NaN for the placeholder or anything that does not start with a number.
pub fn parse_leading_number(text: &str) -> f64 {
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Inverse of [`format_reading`]: the raw value in base units.
///
/// The unit suffix selects the scale, so readings rendered in different units
/// aggregate correctly. Unknown suffixes are taken as base units.
pub fn parse_reading(text: &str) -> f64 {
    let number = parse_leading_number(text);
    if number.is_nan() {
        return number;
    }
    let unit = text.split_whitespace().nth(1).unwrap_or("");
    let divisor = match unit {
        "nA" => 1e9,
        "μV" | "µV" | "μA" | "µA" | "uV" | "uA" => 1e6,
        "mV" | "mA" => 1e3,
        _ => 1.0,
    };
    number / divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn documented_examples() {
        assert_eq!(format_reading(0.0005, Phase::Voltage), "500.000 μV");
        assert_eq!(format_reading(2.5, Phase::Current), "2.500 A");
        assert_eq!(format_reading(5e-7, Phase::Current), "500.000 nA");
        assert_eq!(format_reading(1.234, Phase::Voltage), "1.234 V");
    }

    #[test]
    fn unit_boundaries() {
        assert_eq!(format_reading(1e-3, Phase::Voltage), "1.000 mV");
        assert_eq!(format_reading(1.0, Phase::Voltage), "1.000 V");
        assert_eq!(format_reading(0.25, Phase::Voltage), "250.000 mV");
        assert_eq!(format_reading(1e-6, Phase::Current), "1.000 μA");
        assert_eq!(format_reading(0.02, Phase::Current), "20.000 mA");
        assert_eq!(format_reading(-0.02, Phase::Current), "-20.000 mA");
    }

    #[test]
    fn nan_is_placeholder_for_every_phase() {
        for phase in Phase::ALL {
            assert_eq!(format_reading(f64::NAN, phase), PLACEHOLDER);
        }
    }

    #[test]
    fn leading_number_extraction() {
        assert_eq!(parse_leading_number("500.000 μV"), 500.0);
        assert_eq!(parse_leading_number("  -1.5 A"), -1.5);
        assert!(parse_leading_number(PLACEHOLDER).is_nan());
        assert!(parse_leading_number("").is_nan());
        assert!(parse_leading_number("V 1.0").is_nan());
    }

    #[test]
    fn parse_reading_applies_unit() {
        assert!((parse_reading("500.000 μV") - 5e-4).abs() < 1e-12);
        assert!((parse_reading("20.000 mA") - 0.02).abs() < 1e-12);
        assert!((parse_reading("500.000 nA") - 5e-7).abs() < 1e-15);
        assert!(parse_reading(PLACEHOLDER).is_nan());
    }

    fn display_scale(v: f64, phase: Phase) -> f64 {
        let (table, _) = unit_table(phase);
        table
            .iter()
            .find(|(threshold, _, _)| v.abs() < *threshold)
            .map_or(1.0, |(_, scale, _)| *scale)
    }

    proptest! {
        #[test]
        fn round_trip_within_display_precision(v in -1.0e4f64..1.0e4, current in any::<bool>()) {
            let phase = if current { Phase::Current } else { Phase::Voltage };
            let text = format_reading(v, phase);
            let scale = display_scale(v, phase);
            let tolerance = 5e-4 + 1e-9;

            let shown = parse_leading_number(&text);
            prop_assert!((shown - v * scale).abs() <= tolerance, "{} -> {}", v, text);

            let raw = parse_reading(&text);
            prop_assert!((raw - v).abs() <= tolerance / scale, "{} -> {}", v, text);
        }
    }
}
