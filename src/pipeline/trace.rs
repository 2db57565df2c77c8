// Run tracing
// Append-only JSONL log of pipeline stages, written next to the run outputs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// File name of the trace inside an output directory
pub const TRACE_FILE_NAME: &str = "trace.jsonl";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Segment,
    Separation,
    StemKeys,
    DrumHits,
    NoteSlices,
    Summary,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Segment => "segment",
            Stage::Separation => "separation",
            Stage::StemKeys => "stem_keys",
            Stage::DrumHits => "drum_hits",
            Stage::NoteSlices => "note_slices",
            Stage::Summary => "summary",
        }
    }
}

/// One line of the trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    /// Run this entry belongs to
    pub run_id: Uuid,

    pub stage: Stage,

    /// Progress within the stage [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Stage-specific counts and paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: Stage, progress: f32, message: String) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to a JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries for one run to a JSONL file
pub struct TraceWriter {
    run_id: Uuid,
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(run_id: Uuid, file_path: PathBuf) -> Self {
        TraceWriter { run_id, file_path }
    }

    /// Writer for `<out_dir>/trace.jsonl`
    pub fn in_dir(run_id: Uuid, out_dir: &Path) -> Self {
        Self::new(run_id, out_dir.join(TRACE_FILE_NAME))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Start an entry for a stage of this run
    pub fn stage(&self, stage: Stage) -> TraceBuilder {
        TraceBuilder {
            run_id: self.run_id,
            stage,
        }
    }

    /// Append one entry, creating the file and its directory if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Append an entry, logging instead of failing; a broken trace never aborts a run
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!(
                "Failed to write trace entry to {}: {}",
                self.file_path.display(),
                e
            );
        }
    }
}

/// Builds entries for one stage
pub struct TraceBuilder {
    run_id: Uuid,
    stage: Stage,
}

impl TraceBuilder {
    pub fn start(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, 0.0, message.into())
    }

    pub fn progress(self, progress: f32, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, progress, message.into())
    }

    pub fn complete(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, 1.0, message.into())
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
