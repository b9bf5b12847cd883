//! CLI Entry Point for ate-daq
//!
//! Provides command-line interface for:
//! - Running a voltage/current measurement sequence against a DMM
//! - Listing candidate instrument resources
//! - Identifying the configured instrument
//! - Printing the effective configuration
//!
//! # Usage
//!
//! Run the configured sequence on the simulated meter and export the table:
//! ```bash
//! ate-daq run --mock --order "V only" --cycles 2 --export data/bench.csv
//! ```
//!
//! While a run is active, type `p` to pause or resume. `s` or `q` stops the
//! run; the program exits once the engine reports completion.

use anyhow::{Context, Result};
use ate_daq::config::{Settings, TransportKind};
use ate_daq::data::{CsvExporter, DataSession};
use ate_daq::experiment::{spawn_observer, Observer, RunController, RunState, SequenceEngine};
use ate_daq::instrument::InstrumentManager;
use ate_daq::measurement::Sample;
use ate_daq::tracing_init::{self, TracingConfig};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "ate-daq")]
#[command(about = "Voltage/current acquisition sequencer for bench multimeters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured measurement sequence
    Run {
        /// Configuration file (defaults to config/ate_daq.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use the simulated meter regardless of configuration
        #[arg(long)]
        mock: bool,

        /// Order token: "V->I", "I->V", "Alternating", "V only", "I only"
        #[arg(long)]
        order: Option<String>,

        /// Number of cycles (0 runs until stopped)
        #[arg(long)]
        cycles: Option<u32>,

        /// Write the data table as CSV when the run ends (timestamped file
        /// in the storage directory when no path is given)
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        export: Option<PathBuf>,

        /// Write the run log to this text file when the run ends
        #[arg(long)]
        save_log: Option<PathBuf>,

        /// Print samples as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// List serial ports that may host an instrument
    Scan,

    /// Connect to the configured instrument and print its identity
    Identify {
        /// Configuration file (defaults to config/ate_daq.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration after defaults, file and environment
    Config {
        /// Configuration file (defaults to config/ate_daq.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            mock,
            order,
            cycles,
            export,
            save_log,
            json,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if mock {
                settings.instrument.transport = TransportKind::Mock;
            }
            if let Some(order) = order {
                settings.sequence.order = order;
            }
            if let Some(cycles) = cycles {
                settings.sequence.cycles = cycles;
            }
            settings.validate()?;
            run_sequence(settings, export, save_log, json).await
        }
        Commands::Scan => {
            tracing_init::init(TracingConfig::default())?;
            scan()
        }
        Commands::Identify { config } => {
            let settings = load_settings(config.as_deref())?;
            identify(&settings).await
        }
        Commands::Config { config } => {
            let settings = load_settings(config.as_deref())?;
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load(path).context("Failed to load configuration")?;
    tracing_init::init_from_settings(&settings)?;
    Ok(settings)
}

/// Prints samples and status changes as they arrive.
struct ConsolePrinter {
    json: bool,
}

impl Observer for ConsolePrinter {
    fn on_sample(&self, sample: &Sample) {
        if self.json {
            match serde_json::to_string(sample) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize sample"),
            }
            return;
        }
        println!(
            "[{}] cycle {:>3}  {:<8} {}",
            sample.clock_time(),
            sample.cycle + 1,
            sample.phase,
            sample.text
        );
    }

    fn on_state_change(&self, state: RunState) {
        println!("Status: {}", state.label());
    }
}

async fn run_sequence(
    settings: Settings,
    export: Option<PathBuf>,
    save_log: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let spec = settings
        .sequence
        .to_spec()
        .map_err(anyhow::Error::msg)
        .context("Invalid sequence")?;

    let mut manager = InstrumentManager::new();
    let identity = manager.connect(&settings.instrument).await?;
    println!("Connected: {}", identity);

    let channel = manager.channel()?;
    let engine = Arc::new(SequenceEngine::new(channel, settings.engine.options()));
    let mut manager = manager.with_run_state(engine.subscribe_state());

    let mut session = DataSession::attach(&engine);
    let mut printer = spawn_observer(engine.subscribe("console"), ConsolePrinter { json });
    let mut controller = RunController::new(engine.clone());

    let run_id = controller.start(spec)?;
    println!(
        "Run {} started ({}). Commands: p = pause/resume, s or q = stop",
        run_id, settings.sequence.order
    );

    let mut commands = spawn_stdin_reader();
    let mut state = engine.subscribe_state();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = state.wait_for(|s| *s == RunState::Completed) => break,
            line = commands.recv(), if stdin_open => match line {
                Some(line) => match line.trim() {
                    "p" => match controller.pause_or_resume() {
                        Some(true) => println!("Pausing..."),
                        Some(false) => println!("Resuming..."),
                        None => println!("No active run"),
                    },
                    "s" | "q" => {
                        controller.stop();
                    }
                    "" => {}
                    other => println!("Unknown command '{}' (p, s, q)", other),
                },
                None => stdin_open = false,
            },
        }
    }

    controller.wait().await;
    if let Some(summary) = session.completed_run().await {
        println!(
            "Run finished: {} ({} samples, {} cycles, {:.1} s)",
            summary.reason,
            summary.samples,
            summary.cycles_completed,
            summary.elapsed.as_secs_f64()
        );
    }
    printer.completed_run().await;
    printer.abort();
    println!("{}", session.cards().render());

    if let Some(path) = export {
        let exporter = CsvExporter::new(&settings.storage.output_dir);
        let path = if path.as_os_str().is_empty() {
            exporter.default_path()
        } else {
            path
        };
        match session.export_csv(&exporter, &path) {
            Ok(rows) => println!("Exported {} rows to {}", rows, path.display()),
            Err(e) => eprintln!("Export failed: {}", e),
        }
    }
    if let Some(path) = save_log {
        session
            .log()
            .save(&path)
            .with_context(|| format!("Failed to save log to {}", path.display()))?;
        println!("Log saved to {}", path.display());
    }

    manager.disconnect()?;
    Ok(())
}

fn scan() -> Result<()> {
    let ports = InstrumentManager::scan()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

async fn identify(settings: &Settings) -> Result<()> {
    let mut manager = InstrumentManager::new();
    let identity = manager.connect(&settings.instrument).await?;
    println!("{}", identity);
    manager.disconnect()?;
    Ok(())
}

/// Forward stdin lines from a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
