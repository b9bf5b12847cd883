//! Collected run data: tables, plot series, live display, summary cards, and
//! CSV export.
//!
//! [`DataSession`] wires all of them to an engine through one reliable
//! subscriber, so the table and the CSV export hold every sample.
pub mod display;
pub mod records;
pub mod storage;
pub mod summary;

pub use display::LiveDisplay;
pub use records::{PlotBuffer, Record, RecordStore};
pub use storage::CsvExporter;
pub use summary::{Card, SummaryCards};

use crate::error::{AppResult, DaqError};
use crate::experiment::{
    spawn_observer, LogEntry, Observer, ObserverTask, RunState, RunSummary, SequenceEngine,
};
use crate::log_capture::LogBuffer;
use crate::measurement::Sample;
use std::path::Path;
use tokio::sync::watch;

#[derive(Clone, Default)]
struct SessionObservers {
    records: RecordStore,
    plot: PlotBuffer,
    display: LiveDisplay,
    cards: SummaryCards,
    log: LogBuffer,
}

impl Observer for SessionObservers {
    fn on_sample(&self, sample: &Sample) {
        self.records.on_sample(sample);
        self.plot.on_sample(sample);
        self.display.on_sample(sample);
        self.cards.on_sample(sample);
    }

    fn on_state_change(&self, state: RunState) {
        self.display.on_state_change(state);
    }

    fn on_log(&self, entry: &LogEntry) {
        self.log.on_log(entry);
    }
}

/// Everything a dashboard shows for one engine.
pub struct DataSession {
    observers: SessionObservers,
    state: watch::Receiver<RunState>,
    task: ObserverTask,
}

impl DataSession {
    /// Subscribe a fresh set of observers to `engine`.
    ///
    /// Delivery is reliable: a full buffer makes the run wait rather than
    /// lose a sample.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(engine: &SequenceEngine) -> Self {
        let observers = SessionObservers::default();
        let events = engine.subscribe_reliable("data-session");
        let task = spawn_observer(events, observers.clone());
        Self {
            observers,
            state: engine.subscribe_state(),
            task,
        }
    }

    /// Data table.
    pub fn records(&self) -> &RecordStore {
        &self.observers.records
    }

    /// Plot series.
    pub fn plot(&self) -> &PlotBuffer {
        &self.observers.plot
    }

    /// Live display.
    pub fn display(&self) -> &LiveDisplay {
        &self.observers.display
    }

    /// Summary cards.
    pub fn cards(&self) -> &SummaryCards {
        &self.observers.cards
    }

    /// Run log.
    pub fn log(&self) -> &LogBuffer {
        &self.observers.log
    }

    /// Wait until every event of the next finished run has been applied.
    pub async fn completed_run(&mut self) -> Option<RunSummary> {
        self.task.completed_run().await
    }

    /// Export the data table as CSV.
    pub fn export_csv(&self, exporter: &CsvExporter, path: &Path) -> AppResult<usize> {
        exporter.export(&self.observers.records.rows(), path)
    }

    /// Empty the table, plot, cards and live value.
    ///
    /// Refused with [`DaqError::Busy`] while a run is in progress.
    pub fn clear(&self) -> AppResult<()> {
        let state = *self.state.borrow();
        if state.is_active() {
            return Err(DaqError::Busy(state));
        }
        self.observers.records.clear();
        self.observers.plot.clear();
        self.observers.cards.clear();
        self.observers.display.clear();
        tracing::debug!("Session data cleared");
        Ok(())
    }
}

impl Drop for DataSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::experiment::EngineOptions;
    use crate::measurement::{OrderMode, Phase, PhaseSpec, SequenceSpec};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn session_collects_a_run_and_clears_after() {
        let engine = SequenceEngine::new(
            Arc::new(MockChannel::constant(0.25).with_readings([0.5])),
            EngineOptions::default(),
        );
        let mut session = DataSession::attach(&engine);

        let spec = SequenceSpec::new(OrderMode::VoltageOnly, 1)
            .with_phase(Phase::Voltage, PhaseSpec::from_secs(1.5, 0.5));
        let handle = engine.start(spec).unwrap();

        // Busy while sampling
        assert!(matches!(session.clear(), Err(DaqError::Busy(RunState::Running))));

        handle.wait().await.unwrap();
        let summary = session.completed_run().await.unwrap();
        assert_eq!(summary.samples, 3);

        assert_eq!(session.records().len(), 3);
        assert_eq!(session.plot().len(), 3);
        assert_eq!(session.display().live_value(), "250.000 mV");
        assert_eq!(session.display().status_label(), "Status: COMPLETED");
        let card = session.cards().card(Phase::Voltage);
        assert_eq!(card.max, Some(0.5));
        assert_eq!(card.min, Some(0.25));
        assert!(!session.log().is_empty());

        session.clear().unwrap();
        assert!(session.records().is_empty());
        assert!(session.plot().is_empty());
        assert_eq!(session.cards().card(Phase::Voltage).count, 0);
        // The run log survives a data clear.
        assert!(!session.log().is_empty());
    }
}
