use crate::error::SweepError;
use crate::sweep::SweepRecord;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes completed sweep records to timestamped JSON files.
#[derive(Debug, Clone)]
pub struct SweepRecorder {
    output_dir: PathBuf,
}

impl SweepRecorder {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Persist one record as `sweep-<UTC timestamp>.json` and return the
    /// written path.
    pub fn save(&self, record: &SweepRecord) -> Result<PathBuf, SweepError> {
        fs::create_dir_all(&self.output_dir)?;

        let filename = format!(
            "sweep-{}.json",
            record.completed_at.format("%Y%m%dT%H%M%S%.3fZ")
        );
        let path = self.output_dir.join(filename);

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| SweepError::Parse(format!("failed to serialize sweep record: {e}")))?;
        fs::write(&path, json)?;

        info!(
            "Saved {} samples to {}",
            record.samples.len(),
            path.display()
        );
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
