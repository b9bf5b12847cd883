//! Engine notifications and their non-blocking fan-out.
//!
//! ```text
//! SequenceEngine → EventDistributor → [RecordStore, LiveDisplay, LogBuffer, ...]
//! ```
//!
//! Each subscriber gets a dedicated bounded `mpsc` channel. Samples and log
//! lines go out with `try_send`, so a slow display subscriber loses them
//! instead of stalling the sampling loop. State changes, completion, and
//! everything bound for a reliable subscriber wait for room instead.

use super::state::RunState;
use crate::measurement::Sample;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Progress information
    Info,
    /// Degraded but continuing (configuration or read failure)
    Warn,
    /// Failure the operator should look at
    Err,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Err => write!(f, "ERROR"),
        }
    }
}

/// Why a run reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    /// Every configured cycle ran
    Exhausted,
    /// A stop request was observed
    Stopped,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionReason::Exhausted => write!(f, "sequence finished"),
            CompletionReason::Stopped => write!(f, "stopped by operator"),
        }
    }
}

/// Outcome of one run, delivered with [`EngineEvent::Completed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier
    pub run_id: Uuid,
    /// How the run ended
    pub reason: CompletionReason,
    /// Samples emitted, failed reads included
    pub samples: u64,
    /// Cycles that ran to the end
    pub cycles_completed: u32,
    /// Wall-clock start
    pub started_at: DateTime<Local>,
    /// Monotonic run length
    pub elapsed: Duration,
}

/// One-line log entry produced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the entry was produced
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Entry stamped with the current local time.
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Notification published by a sequence engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new reading
    Sample(Arc<Sample>),
    /// The run state moved
    StateChanged(RunState),
    /// Operator-facing log line
    Log(LogEntry),
    /// The run is over; sent after the final `StateChanged(Completed)`
    Completed(RunSummary),
}

impl EngineEvent {
    /// State changes and completion, which no subscriber may miss.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EngineEvent::StateChanged(_) | EngineEvent::Completed(_))
    }
}

/// How a subscriber's channel is fed once its buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Samples and log lines are dropped; lifecycle events wait for room
    #[default]
    Lossy,
    /// Every event waits for room
    Reliable,
}

/// Delivery counters for one subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Name given at subscription
    pub subscriber: String,
    /// Events queued successfully
    pub total_sent: u64,
    /// Events lost to a full channel
    pub total_dropped: u64,
}

struct SubscriberEntry {
    id: u64,
    sender: mpsc::Sender<EngineEvent>,
    delivery: Delivery,
    stats: SubscriberStats,
}

/// Fan-out of [`EngineEvent`]s to any number of named subscribers.
///
/// Each subscriber owns a bounded channel. A full [`Delivery::Lossy`] channel
/// loses samples and log lines, but state changes and completion are always
/// delivered, as is everything sent to a [`Delivery::Reliable`] subscriber.
/// Guaranteed events wait for room, so subscribers must keep draining their
/// receivers.
///
/// The lock is never held across an await point.
pub struct EventDistributor {
    subscribers: Mutex<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventDistributor {
    /// Distributor whose subscriber channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Register a named lossy subscriber.
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        self.subscribe_with(name, Delivery::Lossy)
    }

    /// Register a named subscriber that receives every event.
    pub fn subscribe_reliable(&self, name: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        self.subscribe_with(name, Delivery::Reliable)
    }

    /// Register a named subscriber with the given delivery mode.
    pub fn subscribe_with(
        &self,
        name: impl Into<String>,
        delivery: Delivery,
    ) -> mpsc::Receiver<EngineEvent> {
        let name = name.into();
        let (sender, rx) = mpsc::channel(self.capacity);
        tracing::debug!(
            subscriber = %name,
            capacity = self.capacity,
            ?delivery,
            "Event subscriber registered"
        );
        self.subscribers.lock().push(SubscriberEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            sender,
            delivery,
            stats: SubscriberStats {
                subscriber: name,
                ..Default::default()
            },
        });
        rx
    }

    /// Queue `event` for every subscriber.
    ///
    /// Returns without waiting unless a guaranteed event finds a full channel.
    /// Closed channels are unregistered.
    pub async fn publish(&self, event: EngineEvent) {
        for (id, sender) in self.offer(&event) {
            match sender.send(event.clone()).await {
                Ok(()) => self.update(id, |entry| {
                    entry.stats.total_sent = entry.stats.total_sent.saturating_add(1);
                }),
                Err(_) => self.remove(id),
            }
        }
    }

    /// Try every subscriber once; returns the ones that must be waited on.
    fn offer(&self, event: &EngineEvent) -> Vec<(u64, mpsc::Sender<EngineEvent>)> {
        let lifecycle = event.is_lifecycle();
        let mut waiting = Vec::new();
        self.subscribers
            .lock()
            .retain_mut(|entry| match entry.sender.try_send(event.clone()) {
                Ok(()) => {
                    entry.stats.total_sent = entry.stats.total_sent.saturating_add(1);
                    true
                }
                Err(mpsc::error::TrySendError::Full(_))
                    if lifecycle || entry.delivery == Delivery::Reliable =>
                {
                    tracing::trace!(subscriber = %entry.stats.subscriber, "Waiting for room");
                    waiting.push((entry.id, entry.sender.clone()));
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if entry.stats.total_dropped == 0 {
                        tracing::warn!(
                            subscriber = %entry.stats.subscriber,
                            "Event subscriber is falling behind, dropping events"
                        );
                    }
                    entry.stats.total_dropped = entry.stats.total_dropped.saturating_add(1);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        subscriber = %entry.stats.subscriber,
                        "Event subscriber disconnected"
                    );
                    false
                }
            });
        waiting
    }

    fn update(&self, id: u64, apply: impl FnOnce(&mut SubscriberEntry)) {
        if let Some(entry) = self.subscribers.lock().iter_mut().find(|e| e.id == id) {
            apply(entry);
        }
    }

    fn remove(&self, id: u64) {
        self.subscribers.lock().retain(|entry| {
            if entry.id == id {
                tracing::debug!(
                    subscriber = %entry.stats.subscriber,
                    "Event subscriber disconnected"
                );
            }
            entry.id != id
        });
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Snapshot of per-subscriber delivery counters.
    pub fn stats(&self) -> Vec<SubscriberStats> {
        self.subscribers
            .lock()
            .iter()
            .map(|entry| entry.stats.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Phase;
    use tracing_test::traced_test;

    fn state(s: RunState) -> EngineEvent {
        EngineEvent::StateChanged(s)
    }

    fn sample(value: f64) -> EngineEvent {
        EngineEvent::Sample(Arc::new(Sample::new(
            Phase::Voltage,
            value,
            0,
            Duration::ZERO,
        )))
    }

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            reason: CompletionReason::Stopped,
            samples: 0,
            cycles_completed: 0,
            started_at: Local::now(),
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_in_order() {
        let distributor = EventDistributor::new(8);
        let mut a = distributor.subscribe("a");
        let mut b = distributor.subscribe_reliable("b");

        distributor.publish(state(RunState::Running)).await;
        distributor.publish(state(RunState::Completed)).await;

        for rx in [&mut a, &mut b] {
            assert!(matches!(
                rx.recv().await,
                Some(EngineEvent::StateChanged(RunState::Running))
            ));
            assert!(matches!(
                rx.recv().await,
                Some(EngineEvent::StateChanged(RunState::Completed))
            ));
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn full_subscriber_drops_samples_without_blocking_others() {
        let distributor = EventDistributor::new(1);
        let _slow = distributor.subscribe("slow");
        let mut fast = distributor.subscribe("fast");

        distributor.publish(sample(1.0)).await;
        assert!(fast.recv().await.is_some());
        distributor.publish(sample(2.0)).await;

        let stats = distributor.stats();
        assert_eq!(stats[0].subscriber, "slow");
        assert_eq!(stats[0].total_sent, 1);
        assert_eq!(stats[0].total_dropped, 1);
        assert_eq!(stats[1].total_sent, 2);
        assert_eq!(stats[1].total_dropped, 0);
        assert!(logs_contain("falling behind"));
    }

    #[tokio::test]
    async fn lifecycle_events_wait_for_a_full_lossy_subscriber() {
        let distributor = Arc::new(EventDistributor::new(1));
        let mut rx = distributor.subscribe("display");
        distributor.publish(sample(1.0)).await;

        let publisher = {
            let distributor = Arc::clone(&distributor);
            tokio::spawn(async move {
                distributor.publish(state(RunState::Completed)).await;
                distributor.publish(EngineEvent::Completed(summary())).await;
            })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!publisher.is_finished());

        assert!(matches!(rx.recv().await, Some(EngineEvent::Sample(_))));
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::StateChanged(RunState::Completed))
        ));
        assert!(matches!(rx.recv().await, Some(EngineEvent::Completed(_))));
        publisher.await.unwrap();

        let stats = distributor.stats();
        assert_eq!(stats[0].total_sent, 3);
        assert_eq!(stats[0].total_dropped, 0);
    }

    #[tokio::test]
    async fn reliable_subscriber_gets_every_sample_through_a_small_buffer() {
        let distributor = Arc::new(EventDistributor::new(2));
        let mut rx = distributor.subscribe_reliable("records");
        let consumer = tokio::spawn(async move {
            let mut count = 0;
            while let Some(event) = rx.recv().await {
                if matches!(event, EngineEvent::Sample(_)) {
                    count += 1;
                }
            }
            count
        });

        for i in 0..50 {
            distributor.publish(sample(f64::from(i))).await;
        }
        let stats = distributor.stats();
        drop(distributor);

        assert_eq!(consumer.await.unwrap(), 50);
        assert_eq!(stats[0].total_sent, 50);
        assert_eq!(stats[0].total_dropped, 0);
    }

    #[tokio::test]
    async fn closed_subscribers_are_removed() {
        let distributor = EventDistributor::new(4);
        let rx = distributor.subscribe("gone");
        let _kept = distributor.subscribe("kept");
        assert_eq!(distributor.subscriber_count(), 2);

        drop(rx);
        distributor.publish(state(RunState::Running)).await;
        assert_eq!(distributor.subscriber_count(), 1);
    }

    #[test]
    fn lifecycle_classification() {
        assert!(state(RunState::Paused).is_lifecycle());
        assert!(EngineEvent::Completed(summary()).is_lifecycle());
        assert!(!sample(1.0).is_lifecycle());
        assert!(!EngineEvent::Log(LogEntry::now(LogLevel::Info, "x")).is_lifecycle());
    }

    #[test]
    fn log_entry_line_format() {
        let entry = LogEntry::now(LogLevel::Warn, "range write failed");
        let line = entry.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] WARN: range write failed"));
    }
}
