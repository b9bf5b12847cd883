//! A bounded log collector for the operator-facing run log.
//!
//! The buffer is an [`Observer`]: it keeps the engine's `Log` events (never
//! tracing output) so a frontend can show them and the operator can save them
//! to a text file.

use crate::error::{AppResult, DaqError};
use crate::experiment::{LogEntry, LogLevel, Observer};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

const MAX_LOG_ENTRIES: usize = 1000;

/// A thread-safe, fixed-capacity log buffer. Oldest entries are dropped first.
#[derive(Clone)]
pub struct LogBuffer(Arc<Mutex<VecDeque<LogEntry>>>);

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    /// Empty buffer holding up to 1000 entries.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::with_capacity(
            MAX_LOG_ENTRIES,
        ))))
    }

    /// Lock the buffer for reading.
    pub fn read(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.0.lock()
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&self, entry: LogEntry) {
        let mut buffer = self.0.lock();
        if buffer.len() >= MAX_LOG_ENTRIES {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Entries at `level` or above, oldest first.
    pub fn filtered(&self, min: LogLevel) -> Vec<LogEntry> {
        self.0
            .lock()
            .iter()
            .filter(|entry| severity(entry.level) >= severity(min))
            .cloned()
            .collect()
    }

    /// Retained entries rendered as `[HH:MM:SS] LEVEL: message` lines.
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().iter().map(ToString::to_string).collect()
    }

    /// Write every retained line to `path`, replacing the file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let lines = self.lines();
        let file = File::create(path)
            .map_err(|e| DaqError::Storage(format!("Failed to create log file: {}", e)))?;
        let mut out = BufWriter::new(file);
        for line in &lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        tracing::info!(path = %path.display(), lines = lines.len(), "Run log saved");
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

fn severity(level: LogLevel) -> u8 {
    match level {
        LogLevel::Info => 0,
        LogLevel::Warn => 1,
        LogLevel::Err => 2,
    }
}

impl Observer for LogBuffer {
    fn on_log(&self, entry: &LogEntry) {
        self.push(entry.clone());
    }
}
