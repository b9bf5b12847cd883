//! Append-only sample tables fed by the engine.

use crate::experiment::Observer;
use crate::measurement::{Phase, Sample};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// One row of the data table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Acquisition time, `HH:MM:SS`
    pub time: String,
    /// Phase tag
    pub phase: Phase,
    /// Formatted reading (placeholder for failed reads)
    pub text: String,
}

impl Record {
    /// Row for `sample`.
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            time: sample.clock_time(),
            phase: sample.phase,
            text: sample.text.clone(),
        }
    }

    /// Raw-data view line: `time<TAB>PHASE<TAB>text`.
    pub fn raw_line(&self) -> String {
        format!("{}\t{}\t{}", self.time, self.phase, self.text)
    }
}

/// Shared, append-only list of [`Record`]s.
#[derive(Clone, Default)]
pub struct RecordStore(Arc<Mutex<Vec<Record>>>);

impl RecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every row, oldest first.
    pub fn rows(&self) -> Vec<Record> {
        self.0.lock().clone()
    }

    /// Rows of one phase.
    pub fn rows_for(&self, phase: Phase) -> Vec<Record> {
        self.0
            .lock()
            .iter()
            .filter(|r| r.phase == phase)
            .cloned()
            .collect()
    }

    /// Raw-data text view, one line per row.
    pub fn raw_text(&self) -> String {
        self.0
            .lock()
            .iter()
            .map(Record::raw_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// `true` when no rows were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Observer for RecordStore {
    fn on_sample(&self, sample: &Sample) {
        self.0.lock().push(Record::from_sample(sample));
    }
}

/// Plot series: running sample index against raw value.
///
/// Failed reads stay in the series as NaN so indices line up with the table.
#[derive(Clone, Default)]
pub struct PlotBuffer(Arc<Mutex<Vec<(f64, f64)>>>);

impl PlotBuffer {
    /// Empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every point.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.0.lock().clone()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// `true` when the series is empty.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Observer for PlotBuffer {
    fn on_sample(&self, sample: &Sample) {
        let mut points = self.0.lock();
        let x = points.len() as f64;
        points.push((x, sample.value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::PLACEHOLDER;
    use std::time::Duration;

    fn sample(phase: Phase, value: f64) -> Sample {
        Sample::new(phase, value, 0, Duration::ZERO)
    }

    #[test]
    fn records_keep_text_and_phase() {
        let store = RecordStore::new();
        store.on_sample(&sample(Phase::Voltage, 0.0005));
        store.on_sample(&sample(Phase::Current, f64::NAN));

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "500.000 μV");
        assert_eq!(rows[1].phase, Phase::Current);
        assert_eq!(rows[1].text, PLACEHOLDER);
        assert_eq!(store.rows_for(Phase::Voltage).len(), 1);

        let raw = store.raw_text();
        let first = raw.lines().next().unwrap();
        assert!(first.ends_with("\tVOLTAGE\t500.000 μV"));
    }

    #[test]
    fn plot_indices_include_failed_reads() {
        let plot = PlotBuffer::new();
        plot.on_sample(&sample(Phase::Voltage, 1.0));
        plot.on_sample(&sample(Phase::Voltage, f64::NAN));
        plot.on_sample(&sample(Phase::Voltage, 3.0));

        let points = plot.points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], (2.0, 3.0));
        assert!(points[1].1.is_nan());
    }
}
