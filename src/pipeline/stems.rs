// Stem sets
// The separator's output as a list of named stem files, and per-stem key labeling

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{self, AudioError};
use crate::pipeline::PipelineError;
use crate::tonal::{self, NA_LABEL};

/// Stem that is never key-labeled
pub const DRUMS_STEM: &str = "drums";

/// One separated stem file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stem {
    /// Lowercase stem name, e.g. "bass"
    pub name: String,
    pub path: PathBuf,
}

/// Stems of one separation run, sorted by file name
#[derive(Debug, Clone, Default)]
pub struct StemSet {
    pub stems: Vec<Stem>,
}

impl StemSet {
    pub fn new(mut stems: Vec<Stem>) -> Self {
        stems.sort_by(|a, b| a.path.cmp(&b.path));
        StemSet { stems }
    }

    /// Every `*.wav` directly inside `dir`
    pub fn from_dir(dir: &Path) -> Result<Self, PipelineError> {
        let mut stems = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_wav = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if !path.is_file() || !is_wav {
                continue;
            }

            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            stems.push(Stem { name, path });
        }

        log::debug!("Found {} stems in {}", stems.len(), dir.display());
        Ok(StemSet::new(stems))
    }

    pub fn get(&self, name: &str) -> Option<&Stem> {
        self.stems.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// A stem after key labeling and renaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledStem {
    pub name: String,
    pub key: String,
    pub path: PathBuf,
}

/// Key label of a stem file; drums are always "NA"
pub fn stem_key_label(stem: &Stem) -> Result<String, AudioError> {
    if stem.name == DRUMS_STEM {
        return Ok(NA_LABEL.to_string());
    }

    let waveform = audio::read_waveform(&stem.path)?;
    Ok(tonal::key_label(tonal::estimate_key(
        waveform.samples(),
        waveform.sample_rate(),
    )))
}

/// `{track}__{stem}__key-{key}.wav`
pub fn labeled_stem_file_name(track: &str, stem: &str, key: &str) -> String {
    format!("{}__{}__key-{}.wav", track, stem, key)
}

/// Estimate a key for each stem and rename it in place to carry the label
pub fn label_stem_keys(set: &StemSet, track: &str) -> Result<Vec<LabeledStem>, PipelineError> {
    let keys: Vec<Result<String, AudioError>> = set.stems.par_iter().map(stem_key_label).collect();

    let mut labeled = Vec::with_capacity(set.len());
    for (stem, key) in set.stems.iter().zip(keys) {
        let key = key?;
        let new_name = labeled_stem_file_name(track, &stem.name, &key);
        let new_path = stem
            .path
            .parent()
            .map(|dir| dir.join(&new_name))
            .unwrap_or_else(|| PathBuf::from(&new_name));

        fs::rename(&stem.path, &new_path)?;
        log::info!("{:>7} | key {:<5} | {}", stem.name, key, new_path.display());

        labeled.push(LabeledStem {
            name: stem.name.clone(),
            key,
            path: new_path,
        });
    }

    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SR: u32 = 22050;

    fn chord(freqs: &[f32]) -> Vec<f32> {
        (0..SR as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                freqs
                    .iter()
                    .map(|f| 0.25 * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_from_dir_lists_sorted_wavs() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["vocals.wav", "bass.wav", "drums.WAV"] {
            audio::write_wav_pcm16(&temp_dir.path().join(name), &[0.0; 64], SR).unwrap();
        }
        fs::write(temp_dir.path().join("readme.txt"), b"x").unwrap();
        fs::create_dir(temp_dir.path().join("drum_hits")).unwrap();

        let set = StemSet::from_dir(temp_dir.path()).unwrap();
        let names: Vec<&str> = set.stems.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bass", "drums", "vocals"]);
        assert!(set.get("drums").is_some());
        assert!(set.get("piano").is_none());
    }

    #[test]
    fn test_from_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = StemSet::from_dir(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_label_and_rename() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        audio::write_wav_pcm16(&dir.join("drums.wav"), &chord(&[60.0]), SR).unwrap();
        audio::write_wav_pcm16(&dir.join("other.wav"), &chord(&[261.63, 329.63, 392.0]), SR)
            .unwrap();

        let set = StemSet::from_dir(dir).unwrap();
        let labeled = label_stem_keys(&set, "song").unwrap();

        assert_eq!(labeled.len(), 2);
        assert_eq!(labeled[0].name, "drums");
        assert_eq!(labeled[0].key, "NA");
        assert_eq!(labeled[0].path, dir.join("song__drums__key-NA.wav"));
        assert_eq!(labeled[1].key, "Cmaj");
        assert_eq!(labeled[1].path, dir.join("song__other__key-Cmaj.wav"));

        assert!(labeled.iter().all(|s| s.path.exists()));
        assert!(!dir.join("drums.wav").exists());
    }

    #[test]
    fn test_short_stem_gets_na() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bass.wav");
        audio::write_wav_pcm16(&path, &[0.2; 500], SR).unwrap();

        let stem = Stem {
            name: "bass".to_string(),
            path,
        };
        assert_eq!(stem_key_label(&stem).unwrap(), "NA");
    }
}
