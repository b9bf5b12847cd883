//! Configuration System using Figment
//!
//! Settings are layered, later sources winning:
//! 1. Built-in defaults
//! 2. `config/ate_daq.toml` (or a file given on the command line)
//! 3. Environment variables prefixed with `ATE_DAQ_`, nested keys split on `__`
//!    (e.g. `ATE_DAQ_SEQUENCE__CYCLES=3`)
//!
//! # Example
//! ```no_run
//! use ate_daq::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let spec = settings.sequence.to_spec()?;
//! println!("{} cycles of {}", spec.cycles, spec.order);
//! # Ok(())
//! # }
//! ```

use crate::channel::{tcp::DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::{AppResult, DaqError};
use crate::experiment::EngineOptions;
use crate::experiment::engine::{DEFAULT_EVENT_CAPACITY, DEFAULT_PAUSE_POLL};
use crate::measurement::phase::{DEFAULT_CYCLES, DEFAULT_DURATION_SECS, DEFAULT_INTERVAL_SECS};
use crate::measurement::{OrderMode, Phase, PhaseSpec, PhaseSpecs, SequenceSpec};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/ate_daq.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ATE_DAQ_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Instrument connection
    pub instrument: InstrumentSettings,
    /// Measurement sequence
    pub sequence: SequenceSettings,
    /// Engine tuning
    pub engine: EngineSettings,
    /// Export location
    pub storage: StorageSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "ATE DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// How the instrument is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Simulated meter
    #[default]
    Mock,
    /// RS-232 / USB-serial
    Serial,
    /// Raw TCP socket
    Tcp,
}

/// Instrument connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Transport to open
    pub transport: TransportKind,
    /// Serial port path or TCP host
    pub resource: String,
    /// TCP port
    pub port: u16,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Bound on every instrument call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Mock,
            resource: String::new(),
            port: DEFAULT_PORT,
            baud_rate: 9600,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl InstrumentSettings {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One phase table of the `[sequence]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    /// Phase length in seconds
    pub duration_s: f64,
    /// Sampling interval in seconds
    pub interval_s: f64,
    /// Range token (`Auto`, `1V`, `10mA`, ...)
    pub range: String,
    /// Instrument autorange
    pub autorange: bool,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            duration_s: DEFAULT_DURATION_SECS,
            interval_s: DEFAULT_INTERVAL_SECS,
            range: "Auto".to_string(),
            autorange: true,
        }
    }
}

impl PhaseSettings {
    fn to_spec(&self, phase: Phase) -> Result<PhaseSpec, String> {
        let secs = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(Duration::from_secs_f64(value))
            } else {
                Err(format!(
                    "{} {} must be a positive number of seconds, got {}",
                    phase, name, value
                ))
            }
        };
        Ok(PhaseSpec {
            duration: secs("duration", self.duration_s)?,
            interval: secs("interval", self.interval_s)?,
            range: self.range.clone(),
            autorange: self.autorange,
        })
    }
}

/// Measurement sequence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Order token (`V->I`, `I->V`, `Alternating`, `V only`, `I only`)
    pub order: String,
    /// Cycle count; 0 runs until stopped
    pub cycles: u32,
    /// Voltage phase
    pub voltage: PhaseSettings,
    /// Current phase
    pub current: PhaseSettings,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            order: OrderMode::default().token().to_string(),
            cycles: DEFAULT_CYCLES,
            voltage: PhaseSettings::default(),
            current: PhaseSettings::default(),
        }
    }
}

impl SequenceSettings {
    /// Convert into an engine-ready sequence.
    ///
    /// Phases excluded by the order mode are not checked.
    pub fn to_spec(&self) -> Result<SequenceSpec, String> {
        let order = OrderMode::parse_token(&self.order).unwrap_or_else(|| {
            let fallback = OrderMode::default();
            tracing::warn!(order = %self.order, "Unrecognized order token, using {}", fallback);
            fallback
        });

        let mut phases = PhaseSpecs::default();
        for phase in Phase::ALL {
            let table = match phase {
                Phase::Voltage => &self.voltage,
                Phase::Current => &self.current,
            };
            if order.includes(phase) {
                phases[phase] = table.to_spec(phase)?;
            }
        }

        let spec = SequenceSpec {
            order,
            cycles: self.cycles,
            phases,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Smallest accepted per-observer event buffer.
pub const MIN_EVENT_CAPACITY: usize = 1;
/// Largest accepted per-observer event buffer.
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Pause-wait poll period in milliseconds
    pub pause_poll_ms: u64,
    /// Events buffered per observer
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pause_poll_ms: DEFAULT_PAUSE_POLL.as_millis() as u64,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineSettings {
    /// Engine options for these settings.
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            pause_poll: Duration::from_millis(self.pause_poll_ms),
            event_capacity: self.event_capacity,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for generated export files
    pub output_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl Settings {
    /// Load from `path` (or [`DEFAULT_CONFIG_PATH`]) and the environment, then validate.
    ///
    /// An explicitly given file must exist; a missing default file only
    /// produces a warning.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(DaqError::Configuration(format!(
                        "Config file '{}' not found",
                        path.display()
                    )));
                }
                Self::load_layered(path)
            }
            None => Self::load_layered(Path::new(DEFAULT_CONFIG_PATH)),
        }
    }

    fn load_layered(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using built-in defaults"
            );
        }
        let settings: Settings = Self::figment(path).extract()?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(settings)
    }

    /// Provider stack used by [`Settings::load`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Render the effective settings as a TOML document.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DaqError::Configuration(format!("Failed to render settings: {}", e)))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(DaqError::Configuration(
                "instrument.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.instrument.transport != TransportKind::Mock
            && self.instrument.resource.trim().is_empty()
        {
            return Err(DaqError::Configuration(format!(
                "instrument.resource is required for the {:?} transport",
                self.instrument.transport
            )));
        }

        if self.engine.pause_poll_ms == 0 {
            return Err(DaqError::Configuration(
                "engine.pause_poll_ms must be > 0".to_string(),
            ));
        }

        if !(MIN_EVENT_CAPACITY..=MAX_EVENT_CAPACITY).contains(&self.engine.event_capacity) {
            return Err(DaqError::Configuration(format!(
                "engine.event_capacity must be between {} and {}, got {}",
                MIN_EVENT_CAPACITY, MAX_EVENT_CAPACITY, self.engine.event_capacity
            )));
        }

        self.sequence
            .to_spec()
            .map(|_| ())
            .map_err(DaqError::Configuration)
    }
}
