// Configuration
// Every processing knob, loadable from JSON and validated before a run

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::onset::{OnsetMode, SliceConfig};
use crate::tools::demucs::DEFAULT_MODEL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub separation: SeparationSettings,
    pub drum_hits: DrumHitSettings,
    pub note_slices: NoteSliceSettings,
}

/// Segment extraction and stem separation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationSettings {
    /// Separation model name
    pub model: String,

    /// Segment start in seconds
    pub start_s: f64,

    /// Segment end in seconds, None for end of input
    pub end_s: Option<f64>,

    /// Only write stems; disables all slicing
    pub stems_only: bool,

    pub drum_hits: bool,
    pub note_slices: bool,
}

impl Default for SeparationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            start_s: 0.0,
            end_s: None,
            stems_only: false,
            drum_hits: false,
            note_slices: false,
        }
    }
}

impl SeparationSettings {
    pub fn drum_hits_enabled(&self) -> bool {
        self.drum_hits && !self.stems_only
    }

    pub fn note_slices_enabled(&self) -> bool {
        self.note_slices && !self.stems_only
    }
}

/// Drum stem hit slicing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumHitSettings {
    pub pre_s: f64,
    pub post_s: f64,
    pub min_interval_s: f64,
    pub delta: f32,
    pub max_events: Option<usize>,
}

impl Default for DrumHitSettings {
    fn default() -> Self {
        let defaults = SliceConfig::percussive();
        Self {
            pre_s: defaults.pre_s,
            post_s: defaults.post_s,
            min_interval_s: defaults.min_interval_s,
            delta: defaults.delta,
            max_events: None,
        }
    }
}

impl DrumHitSettings {
    pub fn slice_config(&self) -> SliceConfig {
        SliceConfig {
            pre_s: self.pre_s,
            post_s: self.post_s,
            min_interval_s: self.min_interval_s,
            delta: self.delta,
            max_events: self.max_events,
            mode: OnsetMode::Percussive,
        }
    }
}

/// Tonal stem event slicing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteSliceSettings {
    pub pre_s: f64,
    pub post_s: f64,
    pub min_interval_s: f64,
    pub delta: f32,
    pub max_events: Option<usize>,

    /// Stems to slice, lowercase
    pub stems: Vec<String>,
}

impl Default for NoteSliceSettings {
    fn default() -> Self {
        let defaults = SliceConfig::tonal();
        Self {
            pre_s: defaults.pre_s,
            post_s: defaults.post_s,
            min_interval_s: defaults.min_interval_s,
            delta: defaults.delta,
            max_events: None,
            stems: ["bass", "guitar", "piano", "vocals", "other"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl NoteSliceSettings {
    pub fn slice_config(&self) -> SliceConfig {
        SliceConfig {
            pre_s: self.pre_s,
            post_s: self.post_s,
            min_interval_s: self.min_interval_s,
            delta: self.delta,
            max_events: self.max_events,
            mode: OnsetMode::Tonal,
        }
    }

    pub fn wants(&self, stem: &str) -> bool {
        self.stems.iter().any(|s| s.eq_ignore_ascii_case(stem))
    }

    /// Parse a comma-separated stem list, dropping blanks
    pub fn parse_stem_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Load settings from a JSON file; missing fields take their defaults
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&contents)?;
    validate_settings(&settings)?;
    log::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let sep = &settings.separation;
    if sep.model.trim().is_empty() {
        return Err(ConfigError::Invalid("separation.model is empty".into()));
    }
    check_time("separation.start_s", sep.start_s)?;
    if let Some(end) = sep.end_s {
        check_time("separation.end_s", end)?;
        if end <= sep.start_s {
            return Err(ConfigError::Invalid(format!(
                "separation.end_s ({}) must be after start_s ({})",
                end, sep.start_s
            )));
        }
    }

    let drums = &settings.drum_hits;
    check_slicing(
        "drum_hits",
        drums.pre_s,
        drums.post_s,
        drums.min_interval_s,
        drums.delta,
        drums.max_events,
    )?;

    let notes = &settings.note_slices;
    check_slicing(
        "note_slices",
        notes.pre_s,
        notes.post_s,
        notes.min_interval_s,
        notes.delta,
        notes.max_events,
    )?;

    Ok(())
}

fn check_time(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_slicing(
    section: &str,
    pre_s: f64,
    post_s: f64,
    min_interval_s: f64,
    delta: f32,
    max_events: Option<usize>,
) -> Result<(), ConfigError> {
    check_time(&format!("{}.pre_s", section), pre_s)?;
    check_time(&format!("{}.post_s", section), post_s)?;
    check_time(&format!("{}.min_interval_s", section), min_interval_s)?;

    if !delta.is_finite() || delta < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{}.delta must be a non-negative number, got {}",
            section, delta
        )));
    }
    if max_events == Some(0) {
        return Err(ConfigError::Invalid(format!(
            "{}.max_events must be at least 1",
            section
        )));
    }

    Ok(())
}
