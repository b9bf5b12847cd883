//! # ATE DAQ Core Library
//!
//! This crate is the core library for the `ate-daq` bench tool. It sequences
//! voltage and current acquisitions on a digital multimeter, streams formatted
//! readings to observers, and keeps the collected data ready for export. The
//! `ate-daq` binary (`main.rs`) is one frontend; a dashboard is another.
//!
//! ## Crate Structure
//!
//! - **`measurement`**: Phases, sequence parameters, the reading formatter and the
//!   range resolver. Pure data and pure functions.
//! - **`channel`**: The `MeasurementChannel` capability the engine drives, the TSP
//!   command set, and serial/TCP/mock implementations.
//! - **`instrument`**: `InstrumentManager`, which connects, identifies and lends the
//!   channel between runs.
//! - **`experiment`**: The `SequenceEngine` background task, its run state machine,
//!   event fan-out, observers and the `RunController` used by frontends.
//! - **`data`**: Observers that collect the table, plot series, live display and
//!   summary cards, plus CSV export.
//! - **`log_capture`**: Bounded run log with save-to-text.
//! - **`config`**: Layered `Settings` loaded with figment.
//! - **`tracing_init`**: tracing subscriber setup.
//! - **`error`**: `DaqError` and the seam errors.
//!
//! ## Example
//!
//! ```no_run
//! use ate_daq::channel::MockChannel;
//! use ate_daq::experiment::{EngineOptions, SequenceEngine};
//! use ate_daq::measurement::{OrderMode, Phase, PhaseSpec, SequenceSpec};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = Arc::new(MockChannel::constant(1.234));
//! let engine = SequenceEngine::new(channel, EngineOptions::default());
//! let mut samples = engine.subscribe("printer");
//!
//! let spec = SequenceSpec::new(OrderMode::VoltageOnly, 2)
//!     .with_phase(Phase::Voltage, PhaseSpec::from_secs(1.0, 0.5));
//! let run = engine.start(spec)?;
//!
//! tokio::spawn(async move {
//!     while let Some(event) = samples.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//! let summary = run.wait().await?;
//! println!("{} samples", summary.samples);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod instrument;
pub mod log_capture;
pub mod measurement;
pub mod tracing_init;
