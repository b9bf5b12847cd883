//! Observer capability and the task that feeds it.
//!
//! Observers never run on the engine's task. [`spawn_observer`] drains a
//! subscriber channel on its own task and dispatches each event to the
//! matching callback, so a slow observer only delays itself.

use super::events::{EngineEvent, LogEntry, RunSummary};
use super::state::RunState;
use crate::measurement::Sample;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Consumer of engine notifications.
///
/// Methods take `&self`; implementations keep their state behind a lock so the
/// foreground can read it while the observer task writes. Every callback has a
/// no-op default.
pub trait Observer: Send + Sync + 'static {
    /// A new reading was emitted.
    fn on_sample(&self, _sample: &Sample) {}

    /// The run state moved.
    fn on_state_change(&self, _state: RunState) {}

    /// The engine logged a line.
    fn on_log(&self, _entry: &LogEntry) {}

    /// The run finished.
    fn on_completed(&self, _summary: &RunSummary) {}
}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn on_sample(&self, sample: &Sample) {
        (**self).on_sample(sample);
    }

    fn on_state_change(&self, state: RunState) {
        (**self).on_state_change(state);
    }

    fn on_log(&self, entry: &LogEntry) {
        (**self).on_log(entry);
    }

    fn on_completed(&self, summary: &RunSummary) {
        (**self).on_completed(summary);
    }
}

/// Dispatch one event to `observer`.
pub fn dispatch(observer: &dyn Observer, event: &EngineEvent) {
    match event {
        EngineEvent::Sample(sample) => observer.on_sample(sample),
        EngineEvent::StateChanged(state) => observer.on_state_change(*state),
        EngineEvent::Log(entry) => observer.on_log(entry),
        EngineEvent::Completed(summary) => observer.on_completed(summary),
    }
}

/// Handle to a running observer task.
pub struct ObserverTask {
    handle: JoinHandle<()>,
    completed: watch::Receiver<Option<RunSummary>>,
}

impl ObserverTask {
    /// Wait until the observer has processed a run completion it has not
    /// reported yet. Every event published before that completion has been
    /// dispatched by the time this returns.
    ///
    /// Returns `None` when the event stream ended first.
    pub async fn completed_run(&mut self) -> Option<RunSummary> {
        self.completed.changed().await.ok()?;
        self.completed.borrow_and_update().clone()
    }

    /// Stop the observer task.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// `true` once the event stream has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Drive `observer` from `events` until the stream closes.
pub fn spawn_observer<O: Observer>(
    mut events: mpsc::Receiver<EngineEvent>,
    observer: O,
) -> ObserverTask {
    let (completed_tx, completed) = watch::channel(None);
    let handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatch(&observer, &event);
            if let EngineEvent::Completed(summary) = event {
                completed_tx.send_replace(Some(summary));
            }
        }
        tracing::trace!("Observer event stream closed");
    });
    ObserverTask { handle, completed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::events::{CompletionReason, LogLevel};
    use crate::measurement::Phase;
    use chrono::Local;
    use parking_lot::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct Tally {
        seen: Mutex<Vec<String>>,
    }

    impl Observer for Tally {
        fn on_sample(&self, sample: &Sample) {
            self.seen.lock().push(format!("sample {}", sample.text));
        }

        fn on_state_change(&self, state: RunState) {
            self.seen.lock().push(format!("state {}", state));
        }

        fn on_log(&self, entry: &LogEntry) {
            self.seen.lock().push(format!("log {}", entry.message));
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            reason: CompletionReason::Exhausted,
            samples: 1,
            cycles_completed: 1,
            started_at: Local::now(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn events_dispatch_in_order_before_completion_is_reported() {
        let (tx, rx) = mpsc::channel(16);
        let tally = Arc::new(Tally::default());
        let mut task = spawn_observer(rx, tally.clone());

        tx.send(EngineEvent::StateChanged(RunState::Running)).await.unwrap();
        tx.send(EngineEvent::Log(LogEntry::now(LogLevel::Info, "cycle 1")))
            .await
            .unwrap();
        tx.send(EngineEvent::Sample(Arc::new(Sample::new(
            Phase::Voltage,
            1.5,
            0,
            Duration::ZERO,
        ))))
        .await
        .unwrap();
        tx.send(EngineEvent::Completed(summary())).await.unwrap();

        let done = task.completed_run().await.unwrap();
        assert_eq!(done.reason, CompletionReason::Exhausted);
        assert_eq!(
            *tally.seen.lock(),
            vec!["state Running", "log cycle 1", "sample 1.500 V"]
        );
    }

    #[tokio::test]
    async fn closed_stream_ends_task() {
        let (tx, rx) = mpsc::channel(1);
        let mut task = spawn_observer(rx, Tally::default());
        drop(tx);
        assert!(task.completed_run().await.is_none());
    }
}
