// Onset detection
// Mel-band log-power spectral flux envelope with local-max / local-average peak picking

use serde::{Deserialize, Serialize};

use crate::audio::ingest::peak_amplitude;
use crate::audio::spectrum::{
    self, MelFilterbank, Spectrogram, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};

/// Waveforms whose peak stays below this are treated as silent
pub const SILENCE_FLOOR: f32 = 1e-4;

/// Dynamic range kept by the dB conversion
const TOP_DB: f32 = 80.0;

/// Power floor before the log
const AMIN: f32 = 1e-10;

/// Mel bands the onset strength is computed over
const ONSET_MEL_BANDS: usize = 128;

/// Median filter lengths for the harmonic mask (frames / bins)
const HARMONIC_KERNEL: usize = 17;
const PERCUSSIVE_KERNEL: usize = 17;

/// Kind of material being sliced; selects hop, peak windows and fade length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetMode {
    /// Drum hits: short hop, narrow peak windows
    Percussive,
    /// Notes, chords and phrases: detection runs on the harmonic component
    Tonal,
}

impl OnsetMode {
    /// Hop size as a divisor of the frame size
    pub fn hop_divisor(&self) -> usize {
        match self {
            OnsetMode::Percussive => 8,
            OnsetMode::Tonal => 4,
        }
    }

    /// Longest fade applied to each end of a fragment, in samples
    pub fn fade_cap(&self) -> usize {
        match self {
            OnsetMode::Percussive => 64,
            OnsetMode::Tonal => 128,
        }
    }

    /// (pre_max, post_max, pre_avg, post_avg) in frames
    pub fn peak_windows(&self) -> (usize, usize, usize, usize) {
        match self {
            OnsetMode::Percussive => (8, 8, 16, 16),
            OnsetMode::Tonal => (16, 16, 32, 32),
        }
    }

    fn emphasize_harmonics(&self) -> bool {
        matches!(self, OnsetMode::Tonal)
    }
}

/// Peak picker parameters, all windows in frames
#[derive(Debug, Clone, PartialEq)]
pub struct PeakPickConfig {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    /// Required margin of a peak above its local average (sensitivity)
    pub delta: f32,
    /// Frames to skip after an accepted peak
    pub wait: usize,
}

impl PeakPickConfig {
    /// Build the peak picker for a mode, sensitivity and minimum spacing
    pub fn for_mode(
        mode: OnsetMode,
        delta: f32,
        min_interval_s: f64,
        sample_rate: u32,
        hop: usize,
    ) -> Self {
        let (pre_max, post_max, pre_avg, post_avg) = mode.peak_windows();
        let wait = if hop == 0 {
            1
        } else {
            ((min_interval_s * sample_rate as f64 / hop as f64) as usize).max(1)
        };

        PeakPickConfig {
            pre_max,
            post_max,
            pre_avg,
            post_avg,
            delta,
            wait,
        }
    }
}

/// A detected onset
#[derive(Debug, Clone, PartialEq)]
pub struct Onset {
    /// Spectrogram frame index
    pub frame: usize,

    /// Onset time in seconds
    pub time_s: f64,

    /// Normalized onset strength at the peak [0.0, 1.0]
    pub strength: f32,
}

/// Detect onsets in a mono signal.
/// Empty or near-silent input returns no onsets.
pub fn detect_onsets(
    samples: &[f32],
    sample_rate: u32,
    mode: OnsetMode,
    delta: f32,
    min_interval_s: f64,
) -> Vec<Onset> {
    if samples.is_empty() || sample_rate == 0 || peak_amplitude(samples) < SILENCE_FLOOR {
        return Vec::new();
    }

    let frame_size = spectrum::frame_size_for(samples.len(), MAX_FRAME_SIZE, MIN_FRAME_SIZE);
    let hop_size = (frame_size / mode.hop_divisor()).max(1);
    let spec = spectrum::magnitude_spectrogram(samples, sample_rate, frame_size, hop_size);

    let spec = if mode.emphasize_harmonics() {
        harmonic_component(&spec)
    } else {
        spec
    };

    let envelope = onset_strength(&spec);
    let envelope = match normalize_envelope(&envelope) {
        Some(env) => env,
        None => return Vec::new(),
    };

    let config = PeakPickConfig::for_mode(mode, delta, min_interval_s, sample_rate, hop_size);
    let peaks = peak_pick(&envelope, &config);

    log::debug!(
        "Onset detection ({:?}): frame {}, hop {}, {} frames, {} peaks",
        mode,
        frame_size,
        hop_size,
        envelope.len(),
        peaks.len()
    );

    peaks
        .into_iter()
        .map(|frame| Onset {
            frame,
            time_s: spec.frame_time(frame),
            strength: envelope[frame],
        })
        .collect()
}

/// Onset strength envelope: mean positive first difference of the dB mel power spectrogram.
/// Frame 0 has no predecessor and gets 0.0.
pub fn onset_strength(spec: &Spectrogram) -> Vec<f32> {
    if spec.is_empty() {
        return Vec::new();
    }

    let bank = MelFilterbank::new(spec.sample_rate, spec.frame_size, ONSET_MEL_BANDS);
    let bands = bank.num_bands();
    let mut mel = vec![0.0f32; bands];

    // The loudest band anywhere sets the dB floor
    let mut max_power = 0.0f32;
    for frame in spec.frames() {
        bank.project_power(frame, &mut mel);
        max_power = mel.iter().fold(max_power, |acc, &p| acc.max(p));
    }
    let floor = power_to_db(max_power) - TOP_DB;

    let mut envelope = vec![0.0f32; spec.num_frames()];
    let mut prev = vec![floor; bands];
    let mut cur = vec![floor; bands];
    for (t, frame) in spec.frames().iter().enumerate() {
        bank.project_power(frame, &mut mel);
        for (c, &p) in cur.iter_mut().zip(mel.iter()) {
            *c = power_to_db(p).max(floor);
        }

        if t > 0 {
            let rise: f32 = cur
                .iter()
                .zip(prev.iter())
                .map(|(&c, &p)| (c - p).max(0.0))
                .sum();
            envelope[t] = rise / bands.max(1) as f32;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    envelope
}

fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(AMIN).log10()
}

/// Shift to a zero minimum and scale to a unit maximum.
/// Returns `None` for a flat envelope, which carries no onsets.
pub fn normalize_envelope(envelope: &[f32]) -> Option<Vec<f32>> {
    if envelope.is_empty() {
        return None;
    }

    let min = envelope.iter().fold(f32::INFINITY, |acc, &v| acc.min(v));
    let max = envelope.iter().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let range = max - min;

    if !range.is_finite() || range <= f32::EPSILON {
        return None;
    }

    Some(envelope.iter().map(|&v| (v - min) / range).collect())
}

/// Pick onset frames from a normalized envelope.
///
/// Frame `n` is a peak when it equals the maximum of `x[n - pre_max .. n + post_max]`,
/// is at least `delta` above the mean of `x[n - pre_avg .. n + post_avg]`, and lies more
/// than `wait` frames after the previous peak. Windows are clipped at the edges.
pub fn peak_pick(envelope: &[f32], config: &PeakPickConfig) -> Vec<usize> {
    let len = envelope.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for n in 0..len {
        if let Some(prev) = last {
            if n <= prev + config.wait {
                continue;
            }
        }

        let max_lo = n.saturating_sub(config.pre_max);
        let max_hi = (n + config.post_max.max(1)).min(len);
        let local_max = envelope[max_lo..max_hi]
            .iter()
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        if envelope[n] < local_max {
            continue;
        }

        let avg_lo = n.saturating_sub(config.pre_avg);
        let avg_hi = (n + config.post_avg.max(1)).min(len);
        let window = &envelope[avg_lo..avg_hi];
        let local_avg = window.iter().sum::<f32>() / window.len() as f32;
        if envelope[n] < local_avg + config.delta {
            continue;
        }

        peaks.push(n);
        last = Some(n);
    }

    peaks
}

/// Harmonic part of a spectrogram via soft median-filter masking.
/// Sustained partials (smooth along time) are kept, broadband clicks (smooth along frequency) are attenuated.
pub fn harmonic_component(spec: &Spectrogram) -> Spectrogram {
    let frames = spec.frames();
    let num_frames = frames.len();
    if num_frames == 0 {
        return spec.clone();
    }
    let num_bins = spec.num_bins();

    let half_h = HARMONIC_KERNEL / 2;
    let half_p = PERCUSSIVE_KERNEL / 2;
    let mut buf = Vec::with_capacity(HARMONIC_KERNEL.max(PERCUSSIVE_KERNEL));

    let mut masked = vec![vec![0.0f32; num_bins]; num_frames];
    for t in 0..num_frames {
        let t_lo = t.saturating_sub(half_h);
        let t_hi = (t + half_h + 1).min(num_frames);

        for k in 0..num_bins {
            buf.clear();
            buf.extend((t_lo..t_hi).map(|i| frames[i][k]));
            let harmonic = median(&mut buf);

            let k_lo = k.saturating_sub(half_p);
            let k_hi = (k + half_p + 1).min(num_bins);
            buf.clear();
            buf.extend_from_slice(&frames[t][k_lo..k_hi]);
            let percussive = median(&mut buf);

            let h2 = harmonic * harmonic;
            let p2 = percussive * percussive;
            let mask = if h2 + p2 > 0.0 { h2 / (h2 + p2) } else { 0.0 };
            masked[t][k] = frames[t][k] * mask;
        }
    }

    spec.with_frames(masked)
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    *m
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decaying 1 kHz bursts starting at the given times, silence elsewhere
    fn bursts(times: &[f64], sample_rate: u32, duration_s: f64) -> Vec<f32> {
        let mut signal = vec![0.0f32; (duration_s * sample_rate as f64) as usize];
        let burst_len = (0.2 * sample_rate as f64) as usize;
        for &t in times {
            let start = (t * sample_rate as f64) as usize;
            for j in 0..burst_len {
                if start + j >= signal.len() {
                    break;
                }
                let tt = j as f32 / sample_rate as f32;
                signal[start + j] +=
                    0.8 * (-tt / 0.03).exp() * (2.0 * std::f32::consts::PI * 1000.0 * tt).sin();
            }
        }
        signal
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let silence = vec![0.0f32; 44100];
        assert!(detect_onsets(&silence, 44100, OnsetMode::Percussive, 0.2, 0.06).is_empty());
        assert!(detect_onsets(&silence, 44100, OnsetMode::Tonal, 0.15, 0.08).is_empty());
    }

    #[test]
    fn test_empty_and_near_silent() {
        assert!(detect_onsets(&[], 44100, OnsetMode::Percussive, 0.2, 0.06).is_empty());

        let whisper: Vec<f32> = (0..22050).map(|i| 1e-5 * ((i % 7) as f32 - 3.0)).collect();
        assert!(detect_onsets(&whisper, 22050, OnsetMode::Percussive, 0.2, 0.06).is_empty());
    }

    #[test]
    fn test_detects_bursts() {
        let sr = 22050;
        let truth = [0.25, 0.75, 1.25, 1.75];
        let signal = bursts(&truth, sr, 2.0);

        let onsets = detect_onsets(&signal, sr, OnsetMode::Percussive, 0.2, 0.06);
        assert_eq!(onsets.len(), truth.len());
        for (onset, &t) in onsets.iter().zip(truth.iter()) {
            assert!(
                (onset.time_s - t).abs() < 0.06,
                "onset at {} expected near {}",
                onset.time_s,
                t
            );
        }
    }

    #[test]
    fn test_kicks_survive_alongside_hats() {
        let sr = 44100;
        let truth = [0.25, 0.75, 1.25, 1.75];
        let pattern = [
            (0.25, 60.0f32, 0.05f32),
            (0.75, 9000.0, 0.02),
            (1.25, 60.0, 0.05),
            (1.75, 9000.0, 0.02),
        ];
        let mut signal = vec![0.0f32; sr as usize * 2];
        for &(t, freq, decay) in &pattern {
            let start = (t * sr as f64) as usize;
            for j in 0..(sr as usize / 5) {
                let tt = j as f32 / sr as f32;
                signal[start + j] +=
                    0.9 * (-tt / decay).exp() * (2.0 * std::f32::consts::PI * freq * tt).sin();
            }
        }

        let onsets = detect_onsets(&signal, sr, OnsetMode::Percussive, 0.2, 0.06);
        let times: Vec<f64> = onsets.iter().map(|o| o.time_s).collect();
        assert_eq!(onsets.len(), truth.len(), "onsets at {:?}", times);
        for (onset, &t) in onsets.iter().zip(truth.iter()) {
            assert!(
                (onset.time_s - t).abs() < 0.06,
                "onset at {} expected near {}",
                onset.time_s,
                t
            );
        }
    }

    #[test]
    fn test_onset_strength_rises_at_attack() {
        let sr = 22050;
        let signal = bursts(&[0.5], sr, 1.0);
        let spec = spectrum::magnitude_spectrogram(&signal, sr, 1024, 256);
        let envelope = onset_strength(&spec);

        assert_eq!(envelope.len(), spec.num_frames());
        assert_eq!(envelope[0], 0.0);
        assert!(envelope.iter().all(|&v| v >= 0.0));

        let (peak, _) = envelope
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (t, &v)| if v > acc.1 { (t, v) } else { acc });
        assert!((spec.frame_time(peak) - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_onsets_increasing() {
        let sr = 22050;
        let signal = bursts(&[0.1, 0.4, 0.45, 0.9, 1.3], sr, 1.6);
        let onsets = detect_onsets(&signal, sr, OnsetMode::Percussive, 0.1, 0.03);
        for pair in onsets.windows(2) {
            assert!(pair[1].time_s > pair[0].time_s);
            assert!(pair[1].frame > pair[0].frame);
        }
    }

    #[test]
    fn test_normalize_envelope() {
        assert!(normalize_envelope(&[]).is_none());
        assert!(normalize_envelope(&[0.3, 0.3, 0.3]).is_none());

        let env = normalize_envelope(&[1.0, 3.0, 2.0]).unwrap();
        assert_eq!(env, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_peak_pick_single_peak() {
        let mut env = vec![0.0f32; 40];
        env[20] = 1.0;
        env[19] = 0.5;
        env[21] = 0.5;
        let config = PeakPickConfig {
            pre_max: 3,
            post_max: 3,
            pre_avg: 5,
            post_avg: 5,
            delta: 0.2,
            wait: 1,
        };
        assert_eq!(peak_pick(&env, &config), vec![20]);
    }

    #[test]
    fn test_peak_pick_delta_rejects_weak_peaks() {
        let mut env = vec![0.5f32; 30];
        env[10] = 0.6;
        let config = PeakPickConfig {
            pre_max: 2,
            post_max: 2,
            pre_avg: 4,
            post_avg: 4,
            delta: 0.2,
            wait: 1,
        };
        assert!(peak_pick(&env, &config).is_empty());
    }

    #[test]
    fn test_peak_pick_wait() {
        let mut env = vec![0.0f32; 30];
        env[10] = 1.0;
        env[13] = 1.0;
        env[25] = 1.0;
        let config = PeakPickConfig {
            pre_max: 1,
            post_max: 1,
            pre_avg: 2,
            post_avg: 2,
            delta: 0.1,
            wait: 5,
        };
        assert_eq!(peak_pick(&env, &config), vec![10, 25]);
    }

    #[test]
    fn test_wait_from_min_interval() {
        let config = PeakPickConfig::for_mode(OnsetMode::Percussive, 0.2, 0.06, 44100, 256);
        assert_eq!(config.wait, 10);
        assert_eq!(config.pre_max, 8);
        assert_eq!(config.post_avg, 16);

        let tiny = PeakPickConfig::for_mode(OnsetMode::Tonal, 0.15, 0.0, 44100, 512);
        assert_eq!(tiny.wait, 1);
        assert_eq!(tiny.pre_avg, 32);
    }

    #[test]
    fn test_harmonic_mask_keeps_shape() {
        let sr = 22050;
        let signal: Vec<f32> = (0..8192)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = spectrum::magnitude_spectrogram(&signal, sr, 1024, 256);
        let harmonic = harmonic_component(&spec);

        assert_eq!(harmonic.num_frames(), spec.num_frames());
        assert_eq!(harmonic.num_bins(), spec.num_bins());
        for (h, s) in harmonic.frames().iter().zip(spec.frames().iter()) {
            for (&hv, &sv) in h.iter().zip(s.iter()) {
                assert!(hv <= sv + 1e-6);
            }
        }
    }

    #[test]
    fn test_tonal_mode_finds_note_changes() {
        let sr = 22050;
        let note_len = sr as usize / 2;
        let mut signal = Vec::new();
        for &freq in &[220.0f32, 330.0, 440.0, 550.0] {
            for i in 0..note_len {
                let tt = i as f32 / sr as f32;
                let env = (-tt / 0.2).exp();
                signal.push(0.6 * env * (2.0 * std::f32::consts::PI * freq * tt).sin());
            }
        }

        let onsets = detect_onsets(&signal, sr, OnsetMode::Tonal, 0.15, 0.08);
        assert!(!onsets.is_empty());
        for pair in onsets.windows(2) {
            assert!(pair[1].time_s - pair[0].time_s >= 0.08);
        }
    }
}
