// Pipeline module
// Orchestrates segment extraction, separation, stem key labeling, drum hits and note slices

pub mod drums;
pub mod notes;
pub mod stems;
pub mod trace;

pub use drums::{analyze_drum_hits, slice_and_classify_drum_hits, DrumHit, DrumHitReport};
pub use notes::{analyze_tonal_events, slice_stem_into_events, NoteSliceReport, TonalEvent};
pub use stems::{label_stem_keys, LabeledStem, Stem, StemSet};
pub use trace::{read_trace_file, Stage, TraceBuilder, TraceEntry, TraceError, TraceWriter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::audio::AudioError;
use crate::config::{ConfigError, Settings};
use crate::state::{self, OutputLayout, StorageError};
use crate::tools::{self, ToolError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported format: {0}\n  Supported formats: {formats}", formats = tools::SUPPORTED_EXTENSIONS.join(", "))]
    UnsupportedFormat(String),
}

/// Everything produced from one stems folder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StemOutputs {
    pub stems: Vec<LabeledStem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub drum_hits: Option<DrumHitReport>,

    pub note_slices: Vec<NoteSliceReport>,
}

/// Written to `summary.json` at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub source: PathBuf,
    pub source_sha256: String,
    pub model: String,
    pub start_s: f64,
    pub end_s: Option<f64>,
    pub stems_dir: PathBuf,

    #[serde(flatten)]
    pub outputs: StemOutputs,
}

/// Runs the full stem post-processing pipeline for one input file
pub struct Processor {
    settings: Settings,
}

impl Processor {
    pub fn new(settings: Settings) -> Self {
        Processor { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Extract, separate, label and slice `input`, writing everything under `out_dir`
    pub fn process(&self, input: &Path, out_dir: &Path) -> Result<RunSummary, PipelineError> {
        if !tools::is_supported_input(input) {
            let ext = input
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| "(none)".to_string());
            return Err(PipelineError::UnsupportedFormat(ext));
        }

        let sep = &self.settings.separation;
        let layout = OutputLayout::new(out_dir);
        state::ensure_dir(layout.root())?;

        let run_id = Uuid::new_v4();
        let trace = TraceWriter::in_dir(run_id, layout.root());
        let track = track_name(input);
        let source_sha256 = state::file_sha256(input)?;

        log::info!("Run {} for {}", run_id, input.display());

        let segment_wav = layout.segment_wav(&run_id);
        trace.record(trace.stage(Stage::Segment).start(format!(
            "Extracting {}",
            input.display()
        )));
        let segment = tools::extract_segment(input, &segment_wav, sep.start_s, sep.end_s)?;
        trace.record(
            trace
                .stage(Stage::Segment)
                .complete(format!("{:.2}s extracted", segment.duration_secs()))
                .with_data(serde_json::json!({
                    "frames": segment.frames,
                    "sample_rate": segment.sample_rate,
                })),
        );

        trace.record(
            trace
                .stage(Stage::Separation)
                .start(format!("Separating with {}", sep.model)),
        );
        let separated = tools::run_separator(&segment_wav, layout.root(), &sep.model);
        if let Err(e) = fs::remove_file(&segment_wav) {
            log::warn!("Could not remove {}: {}", segment_wav.display(), e);
        }
        let stems_dir = separated?;
        trace.record(
            trace
                .stage(Stage::Separation)
                .complete(format!("Stems in {}", stems_dir.display())),
        );

        let outputs = self.process_stems(&stems_dir, &track, &trace)?;

        let summary = RunSummary {
            run_id,
            created_at: Utc::now(),
            source: input.to_path_buf(),
            source_sha256,
            model: sep.model.clone(),
            start_s: sep.start_s,
            end_s: sep.end_s,
            stems_dir,
            outputs,
        };

        write_summary(&layout.summary_path(), &summary)?;
        trace.record(
            trace
                .stage(Stage::Summary)
                .complete(format!("Summary written to {}", layout.summary_path().display())),
        );

        Ok(summary)
    }

    /// Label stem keys, then run drum hit and note slicing as enabled.
    /// Works on any folder of stem WAVs named after their stem.
    pub fn process_stems(
        &self,
        stems_dir: &Path,
        track: &str,
        trace: &TraceWriter,
    ) -> Result<StemOutputs, PipelineError> {
        let sep = &self.settings.separation;

        trace.record(trace.stage(Stage::StemKeys).start("Estimating stem keys"));
        let set = StemSet::from_dir(stems_dir)?;
        let stems = label_stem_keys(&set, track)?;
        trace.record(
            trace
                .stage(Stage::StemKeys)
                .complete(format!("{} stems labeled", stems.len()))
                .with_data(serde_json::to_value(&stems)?),
        );

        let mut outputs = StemOutputs {
            stems,
            ..Default::default()
        };

        if sep.drum_hits_enabled() {
            outputs.drum_hits = self.run_drum_hits(stems_dir, track, &outputs.stems, trace)?;
        }

        if sep.note_slices_enabled() {
            outputs.note_slices = self.run_note_slices(stems_dir, track, &outputs.stems, trace)?;
        }

        Ok(outputs)
    }

    fn run_drum_hits(
        &self,
        stems_dir: &Path,
        track: &str,
        stems: &[LabeledStem],
        trace: &TraceWriter,
    ) -> Result<Option<DrumHitReport>, PipelineError> {
        let drums = match stems.iter().find(|s| s.name == stems::DRUMS_STEM) {
            Some(stem) => stem,
            None => {
                log::warn!("No drum stem found. Skipping hit slicing.");
                return Ok(None);
            }
        };

        trace.record(trace.stage(Stage::DrumHits).start("Slicing drum hits"));
        let report = slice_and_classify_drum_hits(
            &drums.path,
            &OutputLayout::drum_hits_dir(stems_dir),
            &self.settings.drum_hits.slice_config(),
            track,
        )?;
        trace.record(
            trace
                .stage(Stage::DrumHits)
                .complete(format!("{} hits exported", report.exported))
                .with_data(serde_json::json!({
                    "onsets_detected": report.onsets_detected,
                    "exported": report.exported,
                    "counts": report.counts,
                })),
        );

        Ok(Some(report))
    }

    fn run_note_slices(
        &self,
        stems_dir: &Path,
        track: &str,
        stems: &[LabeledStem],
        trace: &TraceWriter,
    ) -> Result<Vec<NoteSliceReport>, PipelineError> {
        let notes = &self.settings.note_slices;
        let config = notes.slice_config();
        let wanted: Vec<&LabeledStem> = stems.iter().filter(|s| notes.wants(&s.name)).collect();

        trace.record(
            trace
                .stage(Stage::NoteSlices)
                .start(format!("Slicing {} tonal stems", wanted.len())),
        );

        let mut reports = Vec::with_capacity(wanted.len());
        for (i, stem) in wanted.iter().enumerate() {
            let report = slice_stem_into_events(
                &stem.path,
                &OutputLayout::note_events_dir(stems_dir, &stem.name),
                track,
                &stem.name,
                &config,
            )?;
            trace.record(
                trace
                    .stage(Stage::NoteSlices)
                    .progress(
                        (i + 1) as f32 / wanted.len() as f32,
                        format!("{}: {} slices", stem.name, report.exported),
                    ),
            );
            reports.push(report);
        }

        Ok(reports)
    }
}

/// File stem of the input, used as the prefix of every output name
pub fn track_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string())
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_summary(path: &Path) -> Result<RunSummary, PipelineError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio;
    use crate::config::SeparationSettings;
    use tempfile::TempDir;

    const SR: u32 = 22050;

    fn tone(freqs: &[f32], seconds: f32) -> Vec<f32> {
        (0..(seconds * SR as f32) as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                freqs
                    .iter()
                    .map(|f| 0.25 * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    fn drum_pattern() -> Vec<f32> {
        let mut samples = vec![0.0f32; SR as usize * 2];
        for k in 0..4 {
            let start = (0.2 + 0.45 * k as f32) * SR as f32;
            for j in 0..(SR as usize / 5) {
                let t = j as f32 / SR as f32;
                samples[start as usize + j] +=
                    0.9 * (-t / 0.04).exp() * (2.0 * std::f32::consts::PI * 70.0 * t).sin();
            }
        }
        samples
    }

    fn stems_folder(dir: &Path) {
        audio::write_wav_pcm16(&dir.join("drums.wav"), &drum_pattern(), SR).unwrap();
        audio::write_wav_pcm16(&dir.join("bass.wav"), &tone(&[110.0], 2.0), SR).unwrap();
        audio::write_wav_pcm16(&dir.join("other.wav"), &tone(&[261.63, 329.63, 392.0], 2.0), SR)
            .unwrap();
    }

    #[test]
    fn test_unsupported_format_rejected_before_any_work() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("notes.txt");
        fs::write(&input, b"x").unwrap();

        let out_dir = temp_dir.path().join("out");
        let result = Processor::new(Settings::default()).process(&input, &out_dir);
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(ref e)) if e == ".txt"));
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_track_name() {
        assert_eq!(track_name(Path::new("/music/My Song.flac")), "My Song");
        assert_eq!(track_name(Path::new("/")), "track");
    }

    #[test]
    fn test_process_stems_labels_only_by_default() {
        let temp_dir = TempDir::new().unwrap();
        stems_folder(temp_dir.path());
        let trace = TraceWriter::in_dir(Uuid::new_v4(), temp_dir.path());

        let outputs = Processor::new(Settings::default())
            .process_stems(temp_dir.path(), "song", &trace)
            .unwrap();

        let names: Vec<&str> = outputs.stems.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bass", "drums", "other"]);
        assert_eq!(outputs.stems[1].key, "NA");
        assert_eq!(outputs.stems[2].key, "Cmaj");
        assert!(outputs.drum_hits.is_none());
        assert!(outputs.note_slices.is_empty());

        let entries = read_trace_file(trace.path()).unwrap();
        assert!(entries.iter().any(|e| e.stage == Stage::StemKeys && e.progress == 1.0));
    }

    #[test]
    fn test_process_stems_with_slicing() {
        let temp_dir = TempDir::new().unwrap();
        stems_folder(temp_dir.path());
        let trace = TraceWriter::in_dir(Uuid::new_v4(), temp_dir.path());

        let mut settings = Settings::default();
        settings.separation.drum_hits = true;
        settings.separation.note_slices = true;
        settings.note_slices.stems = vec!["bass".to_string()];

        let outputs = Processor::new(settings)
            .process_stems(temp_dir.path(), "song", &trace)
            .unwrap();

        let drums = outputs.drum_hits.as_ref().unwrap();
        assert!(drums.exported >= 1);
        assert_eq!(drums.counts.total(), drums.exported);
        assert!(temp_dir.path().join("drum_hits").is_dir());

        assert_eq!(outputs.note_slices.len(), 1);
        assert_eq!(outputs.note_slices[0].stem, "bass");
        assert!(temp_dir.path().join("bass_events").is_dir());
    }

    #[test]
    fn test_stems_only_skips_slicing() {
        let temp_dir = TempDir::new().unwrap();
        stems_folder(temp_dir.path());
        let trace = TraceWriter::in_dir(Uuid::new_v4(), temp_dir.path());

        let settings = Settings {
            separation: SeparationSettings {
                stems_only: true,
                drum_hits: true,
                note_slices: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let outputs = Processor::new(settings)
            .process_stems(temp_dir.path(), "song", &trace)
            .unwrap();
        assert!(outputs.drum_hits.is_none());
        assert!(outputs.note_slices.is_empty());
        assert!(!temp_dir.path().join("drum_hits").exists());
    }

    #[test]
    fn test_summary_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: PathBuf::from("song.mp3"),
            source_sha256: state::calculate_sha256(b"song"),
            model: "htdemucs".to_string(),
            start_s: 0.0,
            end_s: Some(30.0),
            stems_dir: PathBuf::from("out/htdemucs/song"),
            outputs: StemOutputs {
                stems: vec![LabeledStem {
                    name: "bass".to_string(),
                    key: "Am".to_string(),
                    path: PathBuf::from("out/htdemucs/song/song__bass__key-Am.wav"),
                }],
                ..Default::default()
            },
        };

        let path = temp_dir.path().join("summary.json");
        write_summary(&path, &summary).unwrap();
        let loaded = read_summary(&path).unwrap();

        assert_eq!(loaded.run_id, summary.run_id);
        assert_eq!(loaded.outputs.stems, summary.outputs.stems);
        assert_eq!(loaded.end_s, Some(30.0));
        assert!(loaded.outputs.drum_hits.is_none());
    }
}
