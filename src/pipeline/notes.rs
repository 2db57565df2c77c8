// Tonal event run
// Slices a tonal stem into note/chord/phrase events labeled with pitch and key

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::{self, Waveform};
use crate::onset::{detect_and_slice, Fragment, SliceConfig};
use crate::pipeline::PipelineError;
use crate::state;
use crate::tonal::{self, Key, PitchEstimate};

/// One sliced event with its labels
#[derive(Debug, Clone)]
pub struct TonalEvent {
    pub fragment: Fragment,
    pub pitch: PitchEstimate,
    pub key: Option<Key>,
}

impl TonalEvent {
    pub fn key_label(&self) -> String {
        tonal::key_label(self.key)
    }
}

#[derive(Debug, Clone)]
pub struct TonalAnalysis {
    pub onsets_detected: usize,
    pub sample_rate: u32,
    pub events: Vec<TonalEvent>,
}

/// Labels of one exported event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLabel {
    pub index: usize,
    pub onset_s: f64,
    pub pitch: String,
    pub voiced_ratio: f32,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSliceReport {
    pub stem: String,
    pub onsets_detected: usize,
    pub exported: usize,
    pub paths: Vec<PathBuf>,
    pub events: Vec<EventLabel>,
    pub sample_rate: u32,
    pub source: PathBuf,
}

/// Slice a tonal waveform and estimate pitch and key of every event
pub fn analyze_tonal_events(waveform: &Waveform, config: &SliceConfig) -> TonalAnalysis {
    let sliced = detect_and_slice(waveform, config);

    let events: Vec<TonalEvent> = sliced
        .fragments
        .into_par_iter()
        .map(|fragment| {
            let pitch = tonal::estimate_pitch(&fragment.samples, fragment.sample_rate);
            let key = tonal::estimate_key(&fragment.samples, fragment.sample_rate);
            TonalEvent {
                fragment,
                pitch,
                key,
            }
        })
        .collect();

    TonalAnalysis {
        onsets_detected: sliced.onsets_detected,
        sample_rate: waveform.sample_rate(),
        events,
    }
}

/// `{prefix}__{stem}__evt-0001__t-0.500s__pitch-A4__key-Am.wav`
pub fn event_file_name(prefix: &str, stem: &str, event: &TonalEvent) -> String {
    format!(
        "{}__{}__evt-{:04}__t-{:.3}s__pitch-{}__key-{}.wav",
        prefix,
        stem,
        event.fragment.index,
        event.fragment.onset_s,
        event.pitch.label(),
        event.key_label()
    )
}

/// Read a tonal stem, slice it into labeled events, and export them to `out_dir`
pub fn slice_stem_into_events(
    stem_wav: &Path,
    out_dir: &Path,
    prefix: &str,
    stem: &str,
    config: &SliceConfig,
) -> Result<NoteSliceReport, PipelineError> {
    let waveform = audio::read_waveform(stem_wav)?;
    let analysis = analyze_tonal_events(&waveform, config);

    state::ensure_dir(out_dir)?;
    let mut paths = Vec::with_capacity(analysis.events.len());
    let mut labels = Vec::with_capacity(analysis.events.len());
    for event in &analysis.events {
        let path = out_dir.join(event_file_name(prefix, stem, event));
        audio::write_wav_pcm16(&path, &event.fragment.samples, event.fragment.sample_rate)?;
        paths.push(path);
        labels.push(EventLabel {
            index: event.fragment.index,
            onset_s: event.fragment.onset_s,
            pitch: event.pitch.label().to_string(),
            voiced_ratio: event.pitch.voiced_ratio,
            key: event.key_label(),
        });
    }

    log::info!(
        "{}: {} onsets, {} slices -> {}",
        stem,
        analysis.onsets_detected,
        paths.len(),
        out_dir.display()
    );

    Ok(NoteSliceReport {
        stem: stem.to_string(),
        onsets_detected: analysis.onsets_detected,
        exported: paths.len(),
        paths,
        events: labels,
        sample_rate: analysis.sample_rate,
        source: stem_wav.to_path_buf(),
    })
}
