//! Instrument connection lifecycle.
//!
//! [`InstrumentManager`] owns the connected [`MeasurementChannel`] between
//! runs and lends it to the sequence engine. Connecting and disconnecting are
//! refused while a run is active so the engine never loses its channel
//! mid-sequence.

use crate::channel::{
    serial::{self, SerialTransport},
    tcp::TcpTransport,
    MeasurementChannel, MockChannel, ScpiTransport, TspChannel,
};
use crate::config::{InstrumentSettings, TransportKind};
use crate::error::{AppResult, ChannelError, DaqError};
use crate::experiment::RunState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Reading the simulated meter returns.
pub const MOCK_READING: f64 = 1.234;

/// Resource name reported for the simulated meter.
pub const MOCK_RESOURCE: &str = "mock";

struct Connection {
    channel: Arc<dyn MeasurementChannel>,
    resource: String,
    identity: String,
}

/// Connect/identify/disconnect for one bench instrument.
#[derive(Default)]
pub struct InstrumentManager {
    connection: Option<Connection>,
    run_state: Option<watch::Receiver<RunState>>,
}

impl InstrumentManager {
    /// Manager with no instrument and no run gating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate connect/disconnect on an engine's run state.
    pub fn with_run_state(mut self, state: watch::Receiver<RunState>) -> Self {
        self.run_state = Some(state);
        self
    }

    /// Candidate resources the operator can pick from.
    pub fn scan() -> AppResult<Vec<String>> {
        let ports = serial::available_ports()
            .map_err(|e| DaqError::Channel(ChannelError::transport(format!("{:#}", e))))?;
        info!(count = ports.len(), "Serial port scan complete");
        Ok(ports)
    }

    /// Open the configured transport and identify the instrument.
    ///
    /// Returns the `*IDN?` answer, or the resource name when the instrument
    /// does not identify itself. Any previous connection is closed first.
    pub async fn connect(&mut self, settings: &InstrumentSettings) -> AppResult<String> {
        self.ensure_idle()?;

        let timeout = settings.timeout();
        let (channel, resource): (Arc<dyn MeasurementChannel>, String) = match settings.transport
        {
            TransportKind::Mock => {
                let mock =
                    MockChannel::constant(MOCK_READING).with_latency(Duration::from_millis(10));
                (Arc::new(mock), MOCK_RESOURCE.to_string())
            }
            TransportKind::Serial => {
                let transport =
                    SerialTransport::open(&settings.resource, settings.baud_rate, timeout)
                        .map_err(|e| ChannelError::transport(format!("{:#}", e)))?;
                let resource = transport.resource();
                (Arc::new(TspChannel::new(transport, timeout)), resource)
            }
            TransportKind::Tcp => {
                let transport = TcpTransport::connect(&settings.resource, settings.port, timeout)
                    .await
                    .map_err(|e| ChannelError::transport(format!("{:#}", e)))?;
                let resource = transport.resource();
                (Arc::new(TspChannel::new(transport, timeout)), resource)
            }
        };

        self.attach(channel, resource).await
    }

    /// Adopt an already-open channel.
    pub async fn attach(
        &mut self,
        channel: Arc<dyn MeasurementChannel>,
        resource: impl Into<String>,
    ) -> AppResult<String> {
        self.ensure_idle()?;
        if self.connection.is_some() {
            self.disconnect()?;
        }

        let resource = resource.into();
        let identity = match channel.identify().await {
            Ok(idn) if !idn.trim().is_empty() => idn.trim().to_string(),
            Ok(_) => resource.clone(),
            Err(e) => {
                warn!(
                    resource = %resource,
                    error = %e,
                    "Instrument did not identify, using resource name"
                );
                resource.clone()
            }
        };

        info!(
            resource = %resource,
            identity = %identity,
            channel = %channel.describe(),
            "Instrument connected"
        );
        self.connection = Some(Connection {
            channel,
            resource,
            identity: identity.clone(),
        });
        Ok(identity)
    }

    /// Release the instrument. Returns `false` when nothing was connected.
    pub fn disconnect(&mut self) -> AppResult<bool> {
        self.ensure_idle()?;
        match self.connection.take() {
            Some(connection) => {
                info!(resource = %connection.resource, "Instrument disconnected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether an instrument is connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Identity captured at connect time.
    pub fn identity(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.identity.as_str())
    }

    /// Resource of the connected instrument.
    pub fn resource(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.resource.as_str())
    }

    /// Channel to hand to a [`SequenceEngine`](crate::experiment::SequenceEngine).
    pub fn channel(&self) -> Result<Arc<dyn MeasurementChannel>, ChannelError> {
        self.connection
            .as_ref()
            .map(|c| c.channel.clone())
            .ok_or(ChannelError::NotConnected)
    }

    fn ensure_idle(&self) -> AppResult<()> {
        if let Some(rx) = &self.run_state {
            let state = *rx.borrow();
            if state.is_active() {
                return Err(DaqError::Busy(state));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn mock_connect_identifies() {
        let mut manager = InstrumentManager::new();
        assert!(!manager.is_connected());
        assert!(matches!(manager.channel(), Err(ChannelError::NotConnected)));

        let identity = manager.connect(&InstrumentSettings::default()).await.unwrap();
        assert!(identity.contains("DMM6500"));
        assert!(manager.is_connected());
        assert_eq!(manager.resource(), Some(MOCK_RESOURCE));

        let channel = manager.channel().unwrap();
        assert_eq!(channel.read_one().await.unwrap(), MOCK_READING);

        assert!(manager.disconnect().unwrap());
        assert!(!manager.disconnect().unwrap());
        assert!(manager.identity().is_none());
    }

    #[tokio::test]
    async fn connect_and_disconnect_refused_mid_run() {
        let (tx, rx) = watch::channel(RunState::Idle);
        let mut manager = InstrumentManager::new().with_run_state(rx);
        manager.connect(&InstrumentSettings::default()).await.unwrap();

        for state in [RunState::Running, RunState::Paused, RunState::Stopping] {
            tx.send_replace(state);
            assert!(matches!(
                manager.connect(&InstrumentSettings::default()).await,
                Err(DaqError::Busy(s)) if s == state
            ));
            assert!(matches!(manager.disconnect(), Err(DaqError::Busy(_))));
            assert!(manager.is_connected());
        }

        tx.send_replace(RunState::Completed);
        assert!(manager.disconnect().unwrap());
    }

    #[tokio::test]
    async fn tcp_connect_uses_idn_answer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line == "*IDN?" {
                    write
                        .write_all(b"KEITHLEY INSTRUMENTS,MODEL DMM6500,04412345,1.7.12b\n")
                        .await
                        .unwrap();
                }
            }
        });

        let settings = InstrumentSettings {
            transport: TransportKind::Tcp,
            resource: "127.0.0.1".into(),
            port,
            ..Default::default()
        };
        let mut manager = InstrumentManager::new();
        let identity = manager.connect(&settings).await.unwrap();
        assert_eq!(identity, "KEITHLEY INSTRUMENTS,MODEL DMM6500,04412345,1.7.12b");
        assert_eq!(manager.resource(), Some(format!("127.0.0.1:{}", port).as_str()));
    }

    #[tokio::test]
    async fn silent_instrument_falls_back_to_resource() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let settings = InstrumentSettings {
            transport: TransportKind::Tcp,
            resource: "127.0.0.1".into(),
            port,
            timeout_ms: 100,
            ..Default::default()
        };
        let mut manager = InstrumentManager::new();
        let identity = manager.connect(&settings).await.unwrap();
        assert_eq!(identity, format!("127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn refused_tcp_connect_is_channel_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let settings = InstrumentSettings {
            transport: TransportKind::Tcp,
            resource: "127.0.0.1".into(),
            port,
            timeout_ms: 500,
            ..Default::default()
        };
        let mut manager = InstrumentManager::new();
        assert!(matches!(
            manager.connect(&settings).await,
            Err(DaqError::Channel(ChannelError::Transport(_)))
        ));
        assert!(!manager.is_connected());
    }
}
