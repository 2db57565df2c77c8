// External tools
// Runs ffmpeg and demucs as child processes; failures carry the tool's own output

pub mod demucs;
pub mod ffmpeg;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub use demucs::{locate_stems_dir, run_separator};
pub use ffmpeg::{extract_segment, SegmentInfo};

/// Input extensions the decoder is asked to handle
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    "wav", "mp3", "flac", "m4a", "aac", "ogg", "wma", "aiff", "aif",
];

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Could not start {tool}: {source}\n  Tip: make sure `{tool}` is installed and on PATH")]
    NotFound {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed ({status}):\n{stderr}\n\nstdout:\n{stdout}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
        stdout: String,
    },

    #[error("Extracted segment is empty. Check --start/--end against the input length.")]
    EmptySegment,

    #[error("Extracted segment is too short for separation ({frames} frames at {sample_rate} Hz). Use a longer segment.")]
    SegmentTooShort { frames: u32, sample_rate: u32 },

    #[error("Could not read extracted segment {path}: {source}")]
    SegmentUnreadable {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Expected stems folder not found. Looked under: {searched}")]
    StemsNotFound { searched: String },
}

/// Captured output of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args...` to completion, capturing output.
/// A non-zero exit is an error carrying stderr and stdout verbatim.
pub fn run_tool(program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError> {
    log::debug!("Running {} {:?}", program, args);

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ToolError::NotFound {
            tool: program.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr,
            stdout,
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

/// Whether the file extension is one of the supported input formats (case-insensitive)
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
