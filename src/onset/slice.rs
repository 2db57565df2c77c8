// Onset slicing
// Turns detected onsets into faded, time-centered fragments of the source waveform

use serde::{Deserialize, Serialize};

use crate::audio::Waveform;
use crate::onset::detect::{self, OnsetMode};

/// Fragments at or below this length are emitted without fades
const MIN_FADE_FRAGMENT: usize = 32;

/// Slicing parameters for one run over one waveform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceConfig {
    /// Seconds kept before each onset
    pub pre_s: f64,

    /// Seconds kept after each onset
    pub post_s: f64,

    /// Minimum gap between accepted onsets in seconds
    pub min_interval_s: f64,

    /// Peak-picker sensitivity (higher = fewer onsets)
    pub delta: f32,

    /// Keep only the earliest N onsets
    pub max_events: Option<usize>,

    pub mode: OnsetMode,
}

impl SliceConfig {
    /// Drum-hit defaults
    pub fn percussive() -> Self {
        SliceConfig {
            pre_s: 0.03,
            post_s: 0.25,
            min_interval_s: 0.06,
            delta: 0.2,
            max_events: None,
            mode: OnsetMode::Percussive,
        }
    }

    /// Tonal event defaults
    pub fn tonal() -> Self {
        SliceConfig {
            pre_s: 0.01,
            post_s: 0.60,
            min_interval_s: 0.08,
            delta: 0.15,
            max_events: None,
            mode: OnsetMode::Tonal,
        }
    }
}

/// A faded slice of a waveform around one onset.
/// Owns its samples; `start..end` are the bounds in the source waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// 1-based position in onset order
    pub index: usize,

    /// Onset time in seconds
    pub onset_s: f64,

    /// First source sample (inclusive)
    pub start: usize,

    /// Last source sample (exclusive)
    pub end: usize,

    pub sample_rate: u32,

    pub samples: Vec<f32>,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// View the fragment as a standalone waveform
    pub fn to_waveform(&self) -> Waveform {
        Waveform::new(self.samples.clone(), self.sample_rate)
    }
}

/// Result of slicing one waveform
#[derive(Debug, Clone)]
pub struct SliceResult {
    /// Raw onsets found by the detector, before spacing and truncation
    pub onsets_detected: usize,

    /// Fragments in onset order
    pub fragments: Vec<Fragment>,
}

/// Detect onsets and cut one faded fragment per retained onset.
///
/// Onsets closer than `min_interval_s` to the previously accepted one are dropped,
/// then the list is truncated to `max_events`. Silent or empty input yields no fragments.
pub fn detect_and_slice(waveform: &Waveform, config: &SliceConfig) -> SliceResult {
    let onsets = detect::detect_onsets(
        waveform.samples(),
        waveform.sample_rate(),
        config.mode,
        config.delta,
        config.min_interval_s,
    );
    let onsets_detected = onsets.len();

    let times: Vec<f64> = onsets.iter().map(|o| o.time_s).collect();
    let mut kept = enforce_min_interval(&times, config.min_interval_s);
    if let Some(max_events) = config.max_events {
        kept.truncate(max_events);
    }

    let fragments: Vec<Fragment> = kept
        .iter()
        .enumerate()
        .map(|(i, &t)| cut_fragment(waveform, i + 1, t, config))
        .collect();

    log::debug!(
        "Sliced {} fragments from {} onsets ({:.2}s of audio)",
        fragments.len(),
        onsets_detected,
        waveform.duration_secs()
    );

    SliceResult {
        onsets_detected,
        fragments,
    }
}

/// Scan times in order, keeping each one at least `min_interval_s` after the last kept time
pub fn enforce_min_interval(times: &[f64], min_interval_s: f64) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::with_capacity(times.len());
    for &t in times {
        match kept.last() {
            Some(&last) if t - last < min_interval_s => {}
            _ => kept.push(t),
        }
    }
    kept
}

/// Sample bounds `[center - pre, center + post)` clamped to `[0, len)`
pub fn fragment_bounds(
    onset_s: f64,
    pre_s: f64,
    post_s: f64,
    sample_rate: u32,
    len: usize,
) -> (usize, usize) {
    let sr = sample_rate as f64;
    let center = (onset_s * sr).round() as i64;
    let pre = (pre_s * sr).round() as i64;
    let post = (post_s * sr).round() as i64;

    let start = (center - pre).clamp(0, len as i64) as usize;
    let end = (center + post).clamp(0, len as i64) as usize;

    (start, end.max(start))
}

/// Linear fade-in and fade-out of `min(fade_cap, len / 8)` samples at each end.
/// Fragments of 32 samples or fewer are left untouched.
pub fn apply_fades(samples: &mut [f32], fade_cap: usize) {
    let len = samples.len();
    if len <= MIN_FADE_FRAGMENT {
        return;
    }

    let fade = fade_cap.min(len / 8);
    if fade < 2 {
        return;
    }

    let denom = (fade - 1) as f32;
    for i in 0..fade {
        let gain = i as f32 / denom;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

fn cut_fragment(waveform: &Waveform, index: usize, onset_s: f64, config: &SliceConfig) -> Fragment {
    let (start, end) = fragment_bounds(
        onset_s,
        config.pre_s,
        config.post_s,
        waveform.sample_rate(),
        waveform.len(),
    );

    let mut samples = waveform.samples()[start..end].to_vec();
    apply_fades(&mut samples, config.mode.fade_cap());

    Fragment {
        index,
        onset_s,
        start,
        end,
        sample_rate: waveform.sample_rate(),
        samples,
    }
}
