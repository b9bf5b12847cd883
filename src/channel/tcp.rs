//! Raw-socket transport for LAN-attached meters.
//!
//! DMM6500-class instruments accept TSP/SCPI text on TCP port 5025. Commands
//! are newline-terminated; every query answers one line.

use super::ScpiTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default raw-socket port for LXI instruments
pub const DEFAULT_PORT: u16 = 5025;

/// Async line-oriented TCP transport
pub struct TcpTransport {
    stream: Mutex<BufReader<TcpStream>>,
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpTransport {
    /// Connect to `host:port`, giving up after `connect_timeout`.
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .with_context(|| format!("Connection timeout to {}:{}", host, port))?
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

        stream.set_nodelay(true)?;

        tracing::info!(host = %host, port = port, "Connected to instrument socket");

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            host: host.to_string(),
            port,
            timeout: connect_timeout,
        })
    }

    /// Set the read timeout for query responses.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    async fn send_line(stream: &mut BufReader<TcpStream>, command: &str) -> Result<()> {
        let line = format!("{}\n", command);
        stream
            .get_mut()
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write command: {}", command))?;
        stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush stream")
    }
}

#[async_trait]
impl ScpiTransport for TcpTransport {
    async fn query(&self, command: &str) -> Result<String> {
        let mut stream = self.stream.lock().await;

        // Drop anything a previous, timed-out query left behind
        let stale = stream.buffer().len();
        if stale > 0 {
            tracing::debug!(bytes = stale, "Discarding stale response bytes");
            stream.consume(stale);
        }

        Self::send_line(&mut stream, command).await?;

        let mut response = String::new();
        match timeout(self.timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => anyhow::bail!("Connection closed by instrument"),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!(command = %command, response = %trimmed, "Socket query");
                Ok(trimmed)
            }
            Ok(Err(e)) => Err(e).context("Failed to read response"),
            Err(_) => anyhow::bail!("Timeout waiting for response to: {}", command),
        }
    }

    async fn command(&self, command: &str) -> Result<()> {
        let mut stream = self.stream.lock().await;
        Self::send_line(&mut stream, command).await?;
        tracing::debug!(command = %command, "Socket write");
        Ok(())
    }

    fn resource(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
