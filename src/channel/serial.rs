//! Serial transport for RS-232/USB-serial meters
//!
//! The `serialport` crate is synchronous, so every exchange runs on Tokio's
//! blocking pool while the port sits behind an async mutex.

use super::ScpiTransport;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

#[cfg(feature = "instrument_serial")]
use serialport::{ClearBuffer, SerialPort};
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Appended to every command.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
const LINE_TERMINATOR: &str = "\n";
/// Ends every response line.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
const RESPONSE_DELIMITER: u8 = b'\n';

/// Byte stream an exchange runs over.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
trait Port: Read + Write {
    /// Throw away input that arrived before the command being sent.
    fn discard_input(&mut self) -> io::Result<()>;
}

#[cfg(feature = "instrument_serial")]
impl Port for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Send one command line and, when asked, read one response line.
///
/// Input left over from an earlier exchange (a reply that arrived after its
/// query timed out) is discarded before writing.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
fn transact<P: Port + ?Sized>(
    port: &mut P,
    command: &str,
    expect_reply: bool,
    timeout: Duration,
) -> Result<String> {
    port.discard_input()
        .context("Failed to discard stale serial input")?;
    port.write_all(format!("{}{}", command, LINE_TERMINATOR).as_bytes())
        .context("Failed to write to serial port")?;
    port.flush().context("Failed to flush serial port")?;
    tracing::debug!(command = %command, "Sent serial command");

    if !expect_reply {
        return Ok(String::new());
    }

    let mut response = Vec::new();
    let mut buffer = [0u8; 1];
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            return Err(anyhow!("Serial read timeout after {:?}", timeout));
        }
        match port.read(&mut buffer) {
            Ok(0) => return Err(anyhow!("Unexpected EOF from serial port")),
            Ok(_) if buffer[0] == RESPONSE_DELIMITER => break,
            Ok(_) => response.push(buffer[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(anyhow!("Serial read error: {}", e)),
        }
    }

    let response = String::from_utf8_lossy(&response).trim().to_string();
    tracing::debug!(response = %response, "Received serial response");
    Ok(response)
}

/// Serial transport speaking newline-terminated text
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
pub struct SerialTransport {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Overall read timeout for one response line
    timeout: Duration,

    #[cfg(feature = "instrument_serial")]
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`.
    #[cfg(feature = "instrument_serial")]
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100)) // Internal read timeout
            .open()
            .with_context(|| {
                format!(
                    "Failed to open serial port '{}' at {} baud",
                    port_name, baud_rate
                )
            })?;

        tracing::debug!(port = %port_name, baud = baud_rate, "Serial port opened");

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            timeout,
            port: Arc::new(Mutex::new(port)),
        })
    }

    /// Open `port_name` at `baud_rate`. Always fails without `instrument_serial`.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(port_name: &str, baud_rate: u32, _timeout: Duration) -> Result<Self> {
        anyhow::bail!(
            "{} ({} @ {} baud)",
            crate::error::DaqError::FeatureNotEnabled("instrument_serial".into()),
            port_name,
            baud_rate
        )
    }

    #[cfg(feature = "instrument_serial")]
    async fn exchange(&self, command: &str, expect_reply: bool) -> Result<String> {
        let command = command.to_string();
        let timeout = self.timeout;
        let port = self.port.clone();

        tokio::task::spawn_blocking(move || {
            let mut port_guard = port.blocking_lock();
            transact(&mut *port_guard, &command, expect_reply, timeout)
        })
        .await
        .context("Serial I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_serial"))]
    async fn exchange(&self, _command: &str, _expect_reply: bool) -> Result<String> {
        Err(crate::error::DaqError::FeatureNotEnabled("instrument_serial".into()).into())
    }
}

#[async_trait]
impl ScpiTransport for SerialTransport {
    async fn query(&self, command: &str) -> Result<String> {
        self.exchange(command, true).await
    }

    async fn command(&self, command: &str) -> Result<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    fn resource(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}

/// Names of serial ports present on this machine.
#[cfg(feature = "instrument_serial")]
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(not(feature = "instrument_serial"))]
pub fn available_ports() -> Result<Vec<String>> {
    Ok(Vec::new())
}
