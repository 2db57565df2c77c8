// Pitch estimation
// YIN fundamental-frequency tracking over overlapping frames, reduced to one note name

use serde::{Deserialize, Serialize};

use crate::audio::ingest::peak_amplitude;
use crate::audio::spectrum::{self, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use crate::onset::detect::SILENCE_FLOOR;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Label used when no pitch or key can be assigned
pub const NA_LABEL: &str = "NA";

/// Search range C2..C7 in Hz
pub const MIN_F0_HZ: f64 = 65.406_391_325_149_66;
pub const MAX_F0_HZ: f64 = 2_093.004_522_404_789;

/// CMNDF dip threshold for a confident period
const YIN_THRESHOLD: f64 = 0.1;

/// Global CMNDF minimum above this means the frame is unvoiced
const UNVOICED_CEILING: f64 = 0.5;

/// Below this fraction of voiced frames the fragment gets no note
const MIN_VOICED_RATIO: f32 = 0.25;

/// Fragments shorter than this are not analysed
const MIN_DURATION_S: f64 = 0.05;

/// Pitch of one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Nearest note name such as "A4", None when unvoiced
    pub note: Option<String>,

    /// Median fundamental frequency of voiced frames in Hz
    pub f0_hz: Option<f64>,

    /// Fraction of analysis frames with a pitch [0.0, 1.0]
    pub voiced_ratio: f32,
}

impl PitchEstimate {
    fn unvoiced(voiced_ratio: f32) -> Self {
        PitchEstimate {
            note: None,
            f0_hz: None,
            voiced_ratio,
        }
    }

    /// Note name or "NA"
    pub fn label(&self) -> &str {
        self.note.as_deref().unwrap_or(NA_LABEL)
    }
}

/// Estimate the dominant note of a mono fragment.
///
/// Frames are the largest power of two not exceeding `min(2048, len)`, hop a quarter
/// of that. Fragments under 50 ms, under 256 samples, or with peak below 1e-4
/// return "NA" with a voiced ratio of 0.
pub fn estimate_pitch(samples: &[f32], sample_rate: u32) -> PitchEstimate {
    if sample_rate == 0 || (samples.len() as f64) < sample_rate as f64 * MIN_DURATION_S {
        return PitchEstimate::unvoiced(0.0);
    }
    if samples.is_empty() || peak_amplitude(samples) < SILENCE_FLOOR {
        return PitchEstimate::unvoiced(0.0);
    }
    if samples.len() < MIN_FRAME_SIZE {
        return PitchEstimate::unvoiced(0.0);
    }

    let frame_size = spectrum::frame_size_for(samples.len(), MAX_FRAME_SIZE, MIN_FRAME_SIZE);
    let hop_size = (frame_size / 4).max(1);
    let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let sr = sample_rate as f64;

    let mut total_frames = 0usize;
    let mut voiced: Vec<f64> = Vec::new();
    let mut start = 0usize;
    while start + frame_size <= signal.len() {
        total_frames += 1;
        if let Some(f0) = yin_frame(&signal[start..start + frame_size], sr) {
            voiced.push(f0);
        }
        start += hop_size;
    }

    if total_frames == 0 {
        return PitchEstimate::unvoiced(0.0);
    }

    let voiced_ratio = voiced.len() as f32 / total_frames as f32;
    if voiced_ratio < MIN_VOICED_RATIO {
        return PitchEstimate::unvoiced(voiced_ratio);
    }

    let f0 = median(&mut voiced);
    let note = hz_to_note_name(f0);
    log::debug!(
        "Pitch {:?} ({:.1} Hz, {}/{} frames voiced)",
        note,
        f0,
        voiced.len(),
        total_frames
    );

    PitchEstimate {
        f0_hz: note.as_ref().map(|_| f0),
        note,
        voiced_ratio,
    }
}

/// MIDI note number nearest to a frequency
pub fn hz_to_midi(freq_hz: f64) -> Option<i32> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return None;
    }
    Some((69.0 + 12.0 * (freq_hz / 440.0).log2()).round() as i32)
}

/// Nearest equal-tempered note name, e.g. 440.0 -> "A4"
pub fn hz_to_note_name(freq_hz: f64) -> Option<String> {
    let midi = hz_to_midi(freq_hz)?;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    Some(format!("{}{}", name, octave))
}

/// YIN period estimate for one frame, None when unvoiced
fn yin_frame(frame: &[f64], sample_rate: f64) -> Option<f64> {
    if frame.iter().all(|&s| s == 0.0) {
        return None;
    }

    let min_lag = (sample_rate / MAX_F0_HZ).floor() as usize;
    let max_lag = ((sample_rate / MIN_F0_HZ).ceil() as usize).min(frame.len() / 2);
    if min_lag.max(1) >= max_lag {
        return None;
    }
    let min_lag = min_lag.max(1);

    let cmndf = cumulative_mean_normalized_difference(&difference_function(frame, max_lag));

    let mut best = None;
    let mut tau = min_lag;
    while tau < cmndf.len() {
        if cmndf[tau] < YIN_THRESHOLD {
            while tau + 1 < cmndf.len() && cmndf[tau + 1] < cmndf[tau] {
                tau += 1;
            }
            best = Some(tau);
            break;
        }
        tau += 1;
    }

    let tau = match best {
        Some(t) => t,
        None => {
            let (idx, &min_val) = cmndf[min_lag..]
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))?;
            if min_val > UNVOICED_CEILING {
                return None;
            }
            min_lag + idx
        }
    };

    let refined = parabolic_interpolation(&cmndf, tau);
    if refined <= 0.0 {
        return None;
    }

    let f0 = sample_rate / refined;
    if f0.is_finite() {
        Some(f0)
    } else {
        None
    }
}

/// d(tau) = sum_j (x[j] - x[j + tau])^2 over a window of `len - max_lag` samples
fn difference_function(signal: &[f64], max_lag: usize) -> Vec<f64> {
    let max_lag = max_lag.min(signal.len() / 2);
    let window = signal.len() - max_lag;
    let mut d = vec![0.0; max_lag + 1];

    for (tau, slot) in d.iter_mut().enumerate().skip(1) {
        *slot = (0..window)
            .map(|j| {
                let diff = signal[j] - signal[j + tau];
                diff * diff
            })
            .sum();
    }

    d
}

fn cumulative_mean_normalized_difference(d: &[f64]) -> Vec<f64> {
    if d.is_empty() {
        return Vec::new();
    }

    let mut cmndf = vec![1.0; d.len()];
    let mut running_sum = 0.0;
    for tau in 1..d.len() {
        running_sum += d[tau];
        if running_sum.abs() > 1e-30 {
            cmndf[tau] = d[tau] * tau as f64 / running_sum;
        }
    }

    cmndf
}

fn parabolic_interpolation(data: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= data.len() {
        return tau as f64;
    }

    let (s0, s1, s2) = (data[tau - 1], data[tau], data[tau + 1]);
    let denominator = 2.0 * s1 - s0 - s2;
    if denominator.abs() < 1e-12 {
        return tau as f64;
    }

    tau as f64 + (s0 - s2) / (2.0 * denominator)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
