// Drum hit run
// Slices a drum stem at its onsets, classifies each hit, and exports labeled WAVs

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::{self, Waveform};
use crate::events::{self, BandFeatures, DrumClass, DrumCounts};
use crate::onset::{detect_and_slice, Fragment, SliceConfig};
use crate::pipeline::PipelineError;
use crate::state;

/// One classified hit
#[derive(Debug, Clone)]
pub struct DrumHit {
    pub fragment: Fragment,
    pub class: DrumClass,
    pub features: BandFeatures,
}

/// In-memory result of slicing and classifying one drum waveform
#[derive(Debug, Clone)]
pub struct DrumHitAnalysis {
    pub onsets_detected: usize,
    pub sample_rate: u32,
    pub hits: Vec<DrumHit>,
}

impl DrumHitAnalysis {
    pub fn counts(&self) -> DrumCounts {
        self.hits.iter().map(|h| h.class).collect()
    }
}

/// Summary of a drum hit run written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrumHitReport {
    pub onsets_detected: usize,
    pub exported: usize,
    pub counts: DrumCounts,
    pub sample_rate: u32,
    pub source: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Slice and classify a drum waveform; hits keep onset order
pub fn analyze_drum_hits(waveform: &Waveform, config: &SliceConfig) -> DrumHitAnalysis {
    let sliced = detect_and_slice(waveform, config);

    let hits: Vec<DrumHit> = sliced
        .fragments
        .into_par_iter()
        .map(|fragment| {
            let result = events::classify(&fragment.samples, fragment.sample_rate);
            DrumHit {
                fragment,
                class: result.class,
                features: result.features,
            }
        })
        .collect();

    DrumHitAnalysis {
        onsets_detected: sliced.onsets_detected,
        sample_rate: waveform.sample_rate(),
        hits,
    }
}

/// `{prefix}__drums__hit-0001__t-0.512s__kick.wav`
pub fn hit_file_name(prefix: &str, hit: &DrumHit) -> String {
    format!(
        "{}__drums__hit-{:04}__t-{:.3}s__{}.wav",
        prefix,
        hit.fragment.index,
        hit.fragment.onset_s,
        hit.class.as_str()
    )
}

/// Write every hit as 16-bit PCM into `out_dir`
pub fn export_drum_hits(
    analysis: &DrumHitAnalysis,
    out_dir: &Path,
    prefix: &str,
) -> Result<Vec<PathBuf>, PipelineError> {
    state::ensure_dir(out_dir)?;

    let mut files = Vec::with_capacity(analysis.hits.len());
    for hit in &analysis.hits {
        let path = out_dir.join(hit_file_name(prefix, hit));
        audio::write_wav_pcm16(&path, &hit.fragment.samples, hit.fragment.sample_rate)?;
        files.push(path);
    }

    Ok(files)
}

/// Read a drum stem, slice and classify its hits, and export them to `out_dir`
pub fn slice_and_classify_drum_hits(
    drums_wav: &Path,
    out_dir: &Path,
    config: &SliceConfig,
    prefix: &str,
) -> Result<DrumHitReport, PipelineError> {
    let waveform = audio::read_waveform(drums_wav)?;
    let analysis = analyze_drum_hits(&waveform, config);
    let files = export_drum_hits(&analysis, out_dir, prefix)?;
    let counts = analysis.counts();

    log::info!(
        "Drum hits: {} onsets, {} exported (kick {}, snare {}, hat {}, other {})",
        analysis.onsets_detected,
        files.len(),
        counts.kick,
        counts.snare,
        counts.hat,
        counts.other
    );

    Ok(DrumHitReport {
        onsets_detected: analysis.onsets_detected,
        exported: files.len(),
        counts,
        sample_rate: analysis.sample_rate,
        source: drums_wav.to_path_buf(),
        files,
    })
}
