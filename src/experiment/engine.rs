//! SequenceEngine - background execution of a measurement sequence.
//!
//! `start()` validates the request, flips the state to `Running` and spawns one
//! task that walks cycles and phases, configures the instrument for each phase
//! and samples it at the configured interval until the phase duration runs
//! out. The call returns immediately with a [`RunHandle`].
//!
//! Instrument failures never end a run. A failed configuration write is logged
//! and skipped; a failed read becomes a NaN sample. Only a stop request or
//! exhausting the cycle count completes the run.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ate_daq::channel::MockChannel;
//! use ate_daq::experiment::{EngineOptions, SequenceEngine};
//! use ate_daq::measurement::{OrderMode, SequenceSpec};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let channel = Arc::new(MockChannel::constant(1.234));
//! let engine = SequenceEngine::new(channel, EngineOptions::default());
//! let mut events = engine.subscribe("printer");
//!
//! let handle = engine.start(SequenceSpec::new(OrderMode::VoltageOnly, 2))?;
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//! let summary = handle.wait().await?;
//! println!("{} samples", summary.samples);
//! # Ok(())
//! # }
//! ```

use super::cancel::CancellationToken;
use super::events::{
    CompletionReason, EngineEvent, EventDistributor, LogEntry, LogLevel, RunSummary,
};
use super::state::RunState;
use crate::channel::MeasurementChannel;
use crate::error::{ChannelError, StartError};
use crate::measurement::{resolve_range, Phase, RangeValue, Sample, SequenceSpec};
use chrono::Local;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default pause-wait poll period.
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(100);
/// Default per-subscriber event buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Tuning knobs of a [`SequenceEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// How often a paused run rechecks its intents
    pub pause_poll: Duration,
    /// Events buffered per subscriber before drops
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pause_poll: DEFAULT_PAUSE_POLL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Owns run state and event fan-out for one measurement channel.
///
/// At most one run exists per engine. The engine's background task is the
/// only writer of [`RunState`].
pub struct SequenceEngine {
    channel: Arc<dyn MeasurementChannel>,
    options: EngineOptions,
    state: Arc<watch::Sender<RunState>>,
    events: Arc<EventDistributor>,
}

impl SequenceEngine {
    /// Create an idle engine sampling `channel`.
    pub fn new(channel: Arc<dyn MeasurementChannel>, options: EngineOptions) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            channel,
            options,
            state: Arc::new(state),
            events: Arc::new(EventDistributor::new(options.event_capacity)),
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch run state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Register a named event subscriber.
    ///
    /// Samples and log lines are dropped while its buffer is full; state
    /// changes and completion are always delivered.
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        self.events.subscribe(name)
    }

    /// Register a named subscriber that receives every event.
    ///
    /// For observers that persist data. The run waits for room in its buffer.
    pub fn subscribe_reliable(&self, name: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        self.events.subscribe_reliable(name)
    }

    /// Event distributor, for delivery statistics.
    pub fn events(&self) -> &EventDistributor {
        &self.events
    }

    /// The channel runs are sampled from.
    pub fn channel(&self) -> &Arc<dyn MeasurementChannel> {
        &self.channel
    }

    /// Engine tuning.
    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Launch a run of `spec` in the background.
    ///
    /// Fails with [`StartError::AlreadyRunning`] unless the engine is `Idle` or
    /// `Completed`, and with [`StartError::InvalidSpec`] when a phase that would
    /// run has a zero duration or interval. A rejected start changes nothing.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, spec), fields(order = %spec.order, cycles = spec.cycles), err)]
    pub fn start(&self, spec: SequenceSpec) -> Result<RunHandle, StartError> {
        let current = self.state();
        if !current.can_begin() {
            return Err(StartError::AlreadyRunning(current));
        }
        spec.validate().map_err(StartError::InvalidSpec)?;

        let mut observed = current;
        let began = self.state.send_if_modified(|state| {
            observed = *state;
            if state.can_begin() {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(StartError::AlreadyRunning(observed));
        }

        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        info!(run_id = %run_id, "Run started");

        let run = RunContext {
            run_id,
            spec,
            channel: Arc::clone(&self.channel),
            token: token.clone(),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
            pause_poll: self.options.pause_poll,
            started: Instant::now(),
            samples: 0,
            cycles_completed: 0,
        };
        let join = tokio::spawn(run.execute());

        Ok(RunHandle {
            run_id,
            token,
            state: self.state.subscribe(),
            join,
        })
    }
}

/// Handle to one background run.
pub struct RunHandle {
    run_id: Uuid,
    token: CancellationToken,
    state: watch::Receiver<RunState>,
    join: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Unique run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// This run's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Ask the run to hold at the next sample tick.
    pub fn pause(&self) {
        self.token.request_pause();
    }

    /// Let a paused run continue.
    pub fn resume(&self) {
        self.token.resume();
    }

    /// Ask the run to complete.
    pub fn stop(&self) {
        self.token.request_stop();
    }

    /// Engine state as last published.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// `true` once the background task has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to complete.
    pub async fn wait(self) -> Result<RunSummary, JoinError> {
        self.join.await
    }
}

/// Everything the background task owns for one run.
struct RunContext {
    run_id: Uuid,
    spec: SequenceSpec,
    channel: Arc<dyn MeasurementChannel>,
    token: CancellationToken,
    state: Arc<watch::Sender<RunState>>,
    events: Arc<EventDistributor>,
    pause_poll: Duration,
    started: Instant,
    samples: u64,
    cycles_completed: u32,
}

impl RunContext {
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    async fn execute(mut self) -> RunSummary {
        let started_at = Local::now();
        self.events
            .publish(EngineEvent::StateChanged(RunState::Running))
            .await;
        let cycles = if self.spec.is_unbounded() {
            "until stopped".to_string()
        } else {
            self.spec.cycles.to_string()
        };
        self.log(
            LogLevel::Info,
            format!("Sequence started: order {}, cycles {}", self.spec.order, cycles),
        )
        .await;

        let reason = match self.run_cycles().await {
            ControlFlow::Break(reason) | ControlFlow::Continue(reason) => reason,
        };

        self.set_state(RunState::Stopping).await;
        self.set_state(RunState::Completed).await;

        let summary = RunSummary {
            run_id: self.run_id,
            reason,
            samples: self.samples,
            cycles_completed: self.cycles_completed,
            started_at,
            elapsed: self.started.elapsed(),
        };
        self.log(
            LogLevel::Info,
            format!("Sequence completed ({}): {} samples", reason, summary.samples),
        )
        .await;
        self.events
            .publish(EngineEvent::Completed(summary.clone()))
            .await;
        summary
    }

    async fn run_cycles(&mut self) -> ControlFlow<CompletionReason, CompletionReason> {
        let mut cycle: u32 = 0;
        while self.spec.is_unbounded() || cycle < self.spec.cycles {
            self.stop_point()?;
            if self.spec.is_unbounded() {
                self.log(LogLevel::Info, format!("Cycle {}", cycle + 1))
                    .await;
            } else {
                self.log(
                    LogLevel::Info,
                    format!("Cycle {}/{}", cycle + 1, self.spec.cycles),
                )
                .await;
            }

            for &phase in self.spec.order.phases() {
                self.stop_point()?;
                self.configure(phase).await;
                self.sample_phase(phase, cycle).await?;
            }

            self.cycles_completed += 1;
            cycle = cycle.wrapping_add(1);
        }
        ControlFlow::Continue(CompletionReason::Exhausted)
    }

    fn stop_point(&self) -> ControlFlow<CompletionReason> {
        if self.token.is_stop_requested() {
            debug!("Stop observed");
            ControlFlow::Break(CompletionReason::Stopped)
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Issue the phase's configuration commands, each independently.
    async fn configure(&self, phase: Phase) {
        let spec = self.spec.phase(phase);
        let range = resolve_range(&spec.range, phase);
        self.log(
            LogLevel::Info,
            format!("{} phase: range {}, autorange {}", phase, range, spec.autorange),
        )
        .await;

        self.attempt(phase, "set function", self.channel.configure_function(phase))
            .await;
        if spec.autorange || range.is_auto() {
            self.attempt(
                phase,
                "enable autorange",
                self.channel.configure_autorange(true),
            )
            .await;
        } else if let RangeValue::Fixed(value) = range {
            self.attempt(
                phase,
                "disable autorange",
                self.channel.configure_autorange(false),
            )
            .await;
            self.attempt(phase, "set range", self.channel.configure_range(value))
                .await;
        }
    }

    async fn attempt<F>(&self, phase: Phase, what: &str, call: F)
    where
        F: Future<Output = Result<(), ChannelError>>,
    {
        if let Err(e) = call.await {
            self.log(LogLevel::Warn, format!("{}: failed to {}: {}", phase, what, e))
                .await;
        }
    }

    /// Sample `phase` until its duration has elapsed, not counting paused time.
    async fn sample_phase(&mut self, phase: Phase, cycle: u32) -> ControlFlow<CompletionReason> {
        let duration = self.spec.phase(phase).duration;
        let interval = self.spec.phase(phase).interval;
        let phase_start = Instant::now();
        let mut paused_for = Duration::ZERO;

        while phase_start.elapsed().saturating_sub(paused_for) < duration {
            self.stop_point()?;
            if self.token.is_pause_requested() {
                paused_for += self.hold().await?;
            }

            let value = match self.channel.read_one().await {
                Ok(value) => value,
                Err(e) => {
                    self.log(LogLevel::Warn, format!("{}: read failed: {}", phase, e))
                        .await;
                    f64::NAN
                }
            };

            let sample = Sample::new(phase, value, cycle, self.started.elapsed());
            debug!(phase = %phase, cycle, value = %sample.text, "Sample");
            self.samples += 1;
            self.events
                .publish(EngineEvent::Sample(Arc::new(sample)))
                .await;

            sleep(interval).await;
        }
        ControlFlow::Continue(())
    }

    /// Wait out a pause request; returns how long the run was held.
    async fn hold(&self) -> ControlFlow<CompletionReason, Duration> {
        let held_at = Instant::now();
        self.set_state(RunState::Paused).await;
        self.log(LogLevel::Info, "Paused").await;

        while self.token.is_pause_requested() {
            self.stop_point()?;
            sleep(self.pause_poll).await;
        }
        self.stop_point()?;

        self.set_state(RunState::Running).await;
        self.log(LogLevel::Info, "Resumed").await;
        ControlFlow::Continue(held_at.elapsed())
    }

    async fn set_state(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Run state changed");
            self.events.publish(EngineEvent::StateChanged(next)).await;
        }
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::now(level, message);
        match level {
            LogLevel::Info => info!("{}", entry.message),
            LogLevel::Warn => warn!("{}", entry.message),
            LogLevel::Err => error!("{}", entry.message),
        }
        self.events.publish(EngineEvent::Log(entry)).await;
    }
}
