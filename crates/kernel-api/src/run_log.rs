//! Append-only JSONL run log: one line per step outcome.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use contracts::ConstructState;

/// One logged step. `selected_pattern` is the whisper pattern consumed on
/// that step, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub state: ConstructState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &RunRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")
    }

    /// Read every record back, skipping blank lines.
    pub fn read_all(&self) -> std::io::Result<Vec<RunRecord>> {
        let raw = fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
            .collect()
    }
}
