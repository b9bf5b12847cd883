//! Per-phase min / max / average cards.
//!
//! Statistics are taken from the formatted text of each record, read back
//! through [`parse_reading`], so they agree with what the table shows. Failed
//! reads are skipped.

use super::records::Record;
use crate::experiment::Observer;
use crate::measurement::{format_reading, parse_reading, Phase, Sample, PLACEHOLDER};
use parking_lot::Mutex;
use std::sync::Arc;

/// Running statistics for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Card {
    /// Smallest reading
    pub min: Option<f64>,
    /// Largest reading
    pub max: Option<f64>,
    sum: f64,
    /// Readings counted
    pub count: u64,
}

impl Card {
    fn add(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += value;
        self.count += 1;
    }

    /// Mean reading.
    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// `[min, max, avg]` rendered for `phase`; unset cards show the placeholder.
    pub fn texts(&self, phase: Phase) -> [String; 3] {
        let show = |v: Option<f64>| {
            v.map_or_else(|| PLACEHOLDER.to_string(), |v| format_reading(v, phase))
        };
        [show(self.min), show(self.max), show(self.avg())]
    }
}

/// Both phase cards, updated as samples arrive.
#[derive(Clone, Default)]
pub struct SummaryCards(Arc<Mutex<[Card; 2]>>);

fn slot(phase: Phase) -> usize {
    match phase {
        Phase::Voltage => 0,
        Phase::Current => 1,
    }
}

impl SummaryCards {
    /// Empty cards.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cards recomputed from a record table.
    pub fn from_records(records: &[Record]) -> Self {
        let cards = Self::new();
        for record in records {
            cards.add_text(record.phase, &record.text);
        }
        cards
    }

    /// Snapshot of one card.
    pub fn card(&self, phase: Phase) -> Card {
        self.0.lock()[slot(phase)]
    }

    /// Multi-line text rendering of both cards.
    pub fn render(&self) -> String {
        Phase::ALL
            .iter()
            .map(|&phase| {
                let [min, max, avg] = self.card(phase).texts(phase);
                format!("{:<8} Min {:>14}  Max {:>14}  Avg {:>14}", phase, min, max, avg)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn add_text(&self, phase: Phase, text: &str) {
        let value = parse_reading(text);
        if !value.is_nan() {
            self.0.lock()[slot(phase)].add(value);
        }
    }

    pub(crate) fn clear(&self) {
        *self.0.lock() = Default::default();
    }
}

impl Observer for SummaryCards {
    fn on_sample(&self, sample: &Sample) {
        self.add_text(sample.phase, &sample.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(phase: Phase, text: &str) -> Record {
        Record {
            time: "12:00:00".into(),
            phase,
            text: text.into(),
        }
    }

    #[test]
    fn mixed_units_aggregate_in_base_units() {
        let cards = SummaryCards::from_records(&[
            record(Phase::Voltage, "500.000 mV"),
            record(Phase::Voltage, "1.500 V"),
            record(Phase::Voltage, PLACEHOLDER),
            record(Phase::Current, "2.000 mA"),
        ]);

        let v = cards.card(Phase::Voltage);
        assert_eq!(v.count, 2);
        assert_eq!(v.min, Some(0.5));
        assert_eq!(v.max, Some(1.5));
        assert_eq!(v.avg(), Some(1.0));
        assert_eq!(
            v.texts(Phase::Voltage),
            ["500.000 mV".to_string(), "1.500 V".into(), "1.000 V".into()]
        );

        let i = cards.card(Phase::Current);
        assert_eq!(i.count, 1);
        assert!((i.avg().unwrap() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn empty_card_shows_placeholder() {
        let cards = SummaryCards::new();
        assert_eq!(
            cards.card(Phase::Current).texts(Phase::Current),
            [PLACEHOLDER.to_string(), PLACEHOLDER.into(), PLACEHOLDER.into()]
        );
        assert!(cards.render().contains("CURRENT"));
    }

    #[test]
    fn clear_resets_both_cards() {
        let cards = SummaryCards::from_records(&[record(Phase::Voltage, "1.000 V")]);
        cards.clear();
        assert_eq!(cards.card(Phase::Voltage), Card::default());
    }
}
