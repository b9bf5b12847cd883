//! CSV export of recorded samples.
//!
//! The file carries a `Timestamp,Phase,Value` header and one row per record.
//! `Value` is the formatted text (e.g. `1.234 V`, or the placeholder for a
//! failed read), not the raw number.
use super::records::Record;
use crate::error::{AppResult, DaqError};
use std::path::{Path, PathBuf};

/// CSV column names.
pub const CSV_HEADER: [&str; 3] = ["Timestamp", "Phase", "Value"];

/// Writer for record tables.
pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    /// Exporter placing generated file names under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Timestamped path inside the output directory.
    pub fn default_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "dmm_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    }

    /// Write `records` to `path`, creating parent directories.
    ///
    /// An empty table is refused so no header-only files appear.
    pub fn export(&self, records: &[Record], path: &Path) -> AppResult<usize> {
        if records.is_empty() {
            return Err(DaqError::Storage("No data to export".to_string()));
        }

        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = path;
            return Err(DaqError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DaqError::Storage(e.to_string()))?;
                }
            }

            let mut writer = csv::Writer::from_path(path)
                .map_err(|e| DaqError::Storage(format!("Failed to create CSV file: {}", e)))?;
            writer
                .write_record(CSV_HEADER)
                .map_err(|e| DaqError::Storage(e.to_string()))?;
            for record in records {
                writer
                    .write_record([record.time.as_str(), record.phase.tag(), record.text.as_str()])
                    .map_err(|e| DaqError::Storage(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| DaqError::Storage(e.to_string()))?;

            tracing::info!(path = %path.display(), rows = records.len(), "Data exported");
            Ok(records.len())
        }
    }
}
