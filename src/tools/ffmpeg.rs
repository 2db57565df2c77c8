// Segment extraction
// Decodes and trims any supported input to 44.1 kHz stereo WAV via ffmpeg

use std::ffi::OsString;
use std::path::Path;

use crate::tools::{run_tool, ToolError};

const FFMPEG: &str = "ffmpeg";

/// Output format handed to the separator
pub const SEGMENT_SAMPLE_RATE: u32 = 44100;
pub const SEGMENT_CHANNELS: u16 = 2;

/// Shortest segment the separator accepts, in seconds
const MIN_SEGMENT_S: f64 = 0.1;

/// Shape of the extracted segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub frames: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SegmentInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Arguments for `ffmpeg`; a zero start and a missing or non-positive end are omitted
pub fn segment_args(input: &Path, output: &Path, start_s: f64, end_s: Option<f64>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into()];

    if start_s > 0.0 {
        args.push("-ss".into());
        args.push(start_s.to_string().into());
    }

    args.push("-i".into());
    args.push(input.as_os_str().to_owned());

    if let Some(end) = end_s.filter(|&e| e > 0.0) {
        let duration = (end - start_s).max(0.0);
        args.push("-t".into());
        args.push(duration.to_string().into());
    }

    args.extend([
        OsString::from("-ar"),
        SEGMENT_SAMPLE_RATE.to_string().into(),
        "-ac".into(),
        SEGMENT_CHANNELS.to_string().into(),
        "-vn".into(),
        output.as_os_str().to_owned(),
    ]);

    args
}

/// Extract `[start_s, end_s)` of `input` into `output` and verify the result is usable
pub fn extract_segment(
    input: &Path,
    output: &Path,
    start_s: f64,
    end_s: Option<f64>,
) -> Result<SegmentInfo, ToolError> {
    log::info!(
        "Extracting segment {:.2}s..{} from {}",
        start_s,
        end_s.map(|e| format!("{:.2}s", e)).unwrap_or_else(|| "end".to_string()),
        input.display()
    );

    run_tool(FFMPEG, &segment_args(input, output, start_s, end_s))?;
    check_segment(output)
}

/// Reject empty segments and segments shorter than 0.1 s
pub fn check_segment(path: &Path) -> Result<SegmentInfo, ToolError> {
    let reader = hound::WavReader::open(path).map_err(|source| ToolError::SegmentUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    let info = SegmentInfo {
        frames: reader.duration(),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };

    if info.frames == 0 {
        return Err(ToolError::EmptySegment);
    }
    if (info.frames as f64) < info.sample_rate as f64 * MIN_SEGMENT_S {
        return Err(ToolError::SegmentTooShort {
            frames: info.frames,
            sample_rate: info.sample_rate,
        });
    }

    log::debug!(
        "Segment has {} frames ({:.2}s, {} ch)",
        info.frames,
        info.duration_secs(),
        info.channels
    );
    Ok(info)
}
