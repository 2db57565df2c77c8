// Key estimation
// Correlates a mean chroma profile against rotated Krumhansl major/minor templates

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::resample::{self, KEY_ANALYSIS_RATE};
use crate::tonal::chroma::{self, Chroma};
use crate::tonal::pitch::{NA_LABEL, NOTE_NAMES};

pub const KRUMHANSL_MAJOR: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

pub const KRUMHANSL_MINOR: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Minimum analysed length in samples at the analysis rate
const MIN_KEY_SAMPLES: usize = 1024;

/// Minimum analysed duration in seconds
const MIN_KEY_DURATION_S: f64 = 0.20;

const NORM_EPSILON: f32 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

/// One of the 24 major/minor keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Pitch class of the tonic, 0 = C
    pub tonic: u8,
    pub mode: Mode,
}

impl Key {
    pub fn new(tonic: u8, mode: Mode) -> Self {
        Key {
            tonic: tonic % 12,
            mode,
        }
    }

    /// Label such as "C#maj" or "Am"
    pub fn label(&self) -> String {
        let name = NOTE_NAMES[self.tonic as usize % 12];
        match self.mode {
            Mode::Major => format!("{}maj", name),
            Mode::Minor => format!("{}m", name),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Key label or "NA"
pub fn key_label(key: Option<Key>) -> String {
    key.map(|k| k.label())
        .unwrap_or_else(|| NA_LABEL.to_string())
}

/// Estimate the key of a mono signal at any sample rate.
///
/// The signal is resampled to 22050 Hz first. Returns None when fewer than
/// 1024 samples or less than 200 ms remain at that rate.
pub fn estimate_key(samples: &[f32], sample_rate: u32) -> Option<Key> {
    if samples.is_empty() || sample_rate == 0 {
        return None;
    }

    let analysed = resample::resample(samples, sample_rate, KEY_ANALYSIS_RATE);
    let min_len = (KEY_ANALYSIS_RATE as f64 * MIN_KEY_DURATION_S) as usize;
    if analysed.len() < MIN_KEY_SAMPLES || analysed.len() < min_len {
        return None;
    }

    let profile = chroma::chroma_profile(&analysed, KEY_ANALYSIS_RATE);
    let (key, score) = best_key_from_chroma(&profile);
    log::debug!("Key {} (score {:.3})", key, score);
    Some(key)
}

/// Highest-scoring key and its correlation.
///
/// Rotations are visited from C upward, major before minor; only a strictly
/// greater score replaces the current best, so ties resolve to the earliest candidate.
pub fn best_key_from_chroma(chroma: &Chroma) -> (Key, f32) {
    let profile = l2_normalize(chroma);
    let major = l2_normalize(&KRUMHANSL_MAJOR);
    let minor = l2_normalize(&KRUMHANSL_MINOR);

    let mut best = (Key::new(0, Mode::Major), -1e9f32);
    for tonic in 0..12u8 {
        for (template, mode) in [(&major, Mode::Major), (&minor, Mode::Minor)] {
            let score = rotated_dot(&profile, template, tonic as usize);
            if score > best.1 {
                best = (Key::new(tonic, mode), score);
            }
        }
    }

    best
}

/// Dot product of `profile` with `template` rotated right by `shift` pitch classes
fn rotated_dot(profile: &Chroma, template: &Chroma, shift: usize) -> f32 {
    (0..12)
        .map(|j| profile[j] * template[(j + 12 - shift) % 12])
        .sum()
}

fn l2_normalize(v: &Chroma) -> Chroma {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    let mut out = [0.0f32; 12];
    for (o, &x) in out.iter_mut().zip(v.iter()) {
        *o = x / norm;
    }
    out
}
