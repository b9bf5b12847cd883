//! Instrument channel capability and its TSP implementation.
//!
//! The sequence engine talks to the instrument only through
//! [`MeasurementChannel`]: four calls, each bounded by a timeout and each
//! failing with [`ChannelError`]. The engine treats every failure as
//! non-fatal.
//!
//! [`TspChannel`] implements the capability for Keithley DMM6500-class
//! meters by emitting TSP text commands over any [`ScpiTransport`]
//! (serial, raw TCP socket).
//!
//! # Example
//!
//! ```rust,no_run
//! use ate_daq::channel::{MeasurementChannel, TspChannel, tcp::TcpTransport};
//! use ate_daq::measurement::Phase;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = TcpTransport::connect("192.168.0.20", 5025, Duration::from_secs(5)).await?;
//! let dmm = TspChannel::new(transport, Duration::from_millis(5000));
//! dmm.configure_function(Phase::Voltage).await?;
//! dmm.configure_autorange(true).await?;
//! let volts = dmm.read_one().await?;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod serial;
pub mod tcp;

pub use mock::MockChannel;

use crate::error::ChannelError;
use crate::measurement::Phase;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Default bound on every instrument call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// TSP command templates for the DMM6500 measure subsystem.
pub mod tsp {
    /// Enable autoranging
    pub const AUTORANGE_ON: &str = "dmm.measure.autorange = dmm.ON";
    /// Disable autoranging
    pub const AUTORANGE_OFF: &str = "dmm.measure.autorange = dmm.OFF";
    /// Select DC voltage
    pub const FUNC_DC_VOLTAGE: &str = "dmm.measure.func = dmm.FUNC_DC_VOLTAGE";
    /// Select DC current
    pub const FUNC_DC_CURRENT: &str = "dmm.measure.func = dmm.FUNC_DC_CURRENT";
    /// Trigger one reading and print it
    pub const MEASURE_READ: &str = "print(dmm.measure.read())";
    /// Identification query
    pub const IDN: &str = "*IDN?";

    /// Fixed range command.
    pub fn set_range(value: f64) -> String {
        format!("dmm.measure.range = {}", value)
    }
}

/// Capability contract a connected instrument exposes to the sequence engine.
///
/// All methods take `&self`; implementations use interior mutability so a
/// channel can be shared behind an `Arc` between the instrument manager and a
/// running engine.
#[async_trait]
pub trait MeasurementChannel: Send + Sync {
    /// Switch instrument autoranging on or off.
    async fn configure_autorange(&self, on: bool) -> Result<(), ChannelError>;

    /// Select the measurement function for `phase`.
    async fn configure_function(&self, phase: Phase) -> Result<(), ChannelError>;

    /// Select a fixed full-scale range in base units.
    async fn configure_range(&self, value: f64) -> Result<(), ChannelError>;

    /// Acquire one reading in base units.
    async fn read_one(&self) -> Result<f64, ChannelError>;

    /// Instrument identity string.
    async fn identify(&self) -> Result<String, ChannelError> {
        Err(ChannelError::Transport(
            "Identification not supported by this channel".into(),
        ))
    }

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Text command/query transport used by [`TspChannel`].
///
/// Abstracts the underlying communication mechanism (serial, TCP) so the
/// command set is written once.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a query command and return the trimmed response.
    async fn query(&self, command: &str) -> anyhow::Result<String>;

    /// Send a command without expecting a response.
    async fn command(&self, command: &str) -> anyhow::Result<()>;

    /// Resource identifier (port path, host:port).
    fn resource(&self) -> String;
}

/// [`MeasurementChannel`] speaking the DMM6500 TSP command set.
pub struct TspChannel<T: ScpiTransport> {
    transport: T,
    timeout: Duration,
}

impl<T: ScpiTransport> TspChannel<T> {
    /// Wrap a transport; every call is bounded by `timeout`.
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn bounded<R, F>(&self, command: &str, call: F) -> Result<R, ChannelError>
    where
        F: Future<Output = anyhow::Result<R>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChannelError::Transport(format!("{:#}", e))),
            Err(_) => Err(ChannelError::Timeout {
                command: command.to_string(),
                after: self.timeout,
            }),
        }
    }

    async fn write(&self, command: &str) -> Result<(), ChannelError> {
        tracing::trace!(command = %command, "TSP write");
        self.bounded(command, self.transport.command(command)).await
    }

    async fn ask(&self, command: &str) -> Result<String, ChannelError> {
        tracing::trace!(command = %command, "TSP query");
        self.bounded(command, self.transport.query(command)).await
    }
}

#[async_trait]
impl<T: ScpiTransport> MeasurementChannel for TspChannel<T> {
    async fn configure_autorange(&self, on: bool) -> Result<(), ChannelError> {
        self.write(if on { tsp::AUTORANGE_ON } else { tsp::AUTORANGE_OFF })
            .await
    }

    async fn configure_function(&self, phase: Phase) -> Result<(), ChannelError> {
        let command = match phase {
            Phase::Voltage => tsp::FUNC_DC_VOLTAGE,
            Phase::Current => tsp::FUNC_DC_CURRENT,
        };
        self.write(command).await
    }

    async fn configure_range(&self, value: f64) -> Result<(), ChannelError> {
        self.write(&tsp::set_range(value)).await
    }

    async fn read_one(&self) -> Result<f64, ChannelError> {
        let response = self.ask(tsp::MEASURE_READ).await?;
        parse_f64_response(tsp::MEASURE_READ, &response)
    }

    async fn identify(&self) -> Result<String, ChannelError> {
        self.ask(tsp::IDN).await
    }

    fn describe(&self) -> String {
        format!(
            "TspChannel({} @ {}ms timeout)",
            self.transport.resource(),
            self.timeout.as_millis()
        )
    }
}

/// Parse a floating-point instrument response.
pub fn parse_f64_response(command: &str, response: &str) -> Result<f64, ChannelError> {
    response
        .trim()
        .parse::<f64>()
        .map_err(|_| ChannelError::MalformedResponse {
            command: command.to_string(),
            response: response.to_string(),
        })
}
