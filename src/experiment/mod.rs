//! Sequence execution: run state, cancellation, event fan-out, the background
//! engine, and the foreground controller.
//!
//! ```text
//!         start / pause / stop          Sample, StateChanged, Log, Completed
//! RunController ─────▶ SequenceEngine ─────▶ EventDistributor ──▶ observers
//!                              │
//!                              └── MeasurementChannel
//! ```

pub mod cancel;
pub mod controller;
pub mod engine;
pub mod events;
pub mod observer;
pub mod state;

pub use cancel::CancellationToken;
pub use controller::{Affordances, RunController};
pub use engine::{EngineOptions, RunHandle, SequenceEngine};
pub use events::{
    CompletionReason, Delivery, EngineEvent, EventDistributor, LogEntry, LogLevel, RunSummary,
    SubscriberStats,
};
pub use observer::{spawn_observer, Observer, ObserverTask};
pub use state::RunState;
