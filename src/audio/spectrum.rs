// Short-time spectral analysis shared by the slicer and both classifiers
// Frame sizes are clamped up front so no transform ever sees fewer samples than it expects

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Smallest transform size ever used
pub const MIN_FRAME_SIZE: usize = 256;

/// Largest transform size used for onset detection and drum classification
pub const MAX_FRAME_SIZE: usize = 2048;

/// Largest power of two not exceeding `min(max_frame, len)`, never below `min_frame`.
///
/// Signals shorter than `min_frame` still get a `min_frame` transform; the
/// spectrogram zero-pads them, so the result is always a usable size.
pub fn frame_size_for(len: usize, max_frame: usize, min_frame: usize) -> usize {
    let capped = len.min(max_frame);
    if capped <= min_frame {
        return min_frame;
    }
    let pow = usize::BITS - 1 - capped.leading_zeros();
    (1usize << pow).max(min_frame)
}

/// Hann window of length `n` (periodic form, matching the STFT convention)
pub fn hann_window(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Magnitude spectrogram stored frame-major: `frames[t][k]`
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frame_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
    frames: Vec<Vec<f32>>,
}

impl Spectrogram {
    /// Number of frequency bins per frame (frame_size / 2 + 1)
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    /// Center frequency of bin `k` in Hz
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.frame_size as f32
    }

    /// Bin center frequencies for the whole frame
    pub fn frequencies(&self) -> Vec<f32> {
        (0..self.num_bins()).map(|k| self.bin_frequency(k)).collect()
    }

    /// Time of frame `t` in seconds (frames are centered on `t * hop`)
    pub fn frame_time(&self, t: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (t * self.hop_size) as f64 / self.sample_rate as f64
    }

    /// Replace the magnitudes with a masked copy of the same shape
    pub(crate) fn with_frames(&self, frames: Vec<Vec<f32>>) -> Spectrogram {
        Spectrogram {
            frame_size: self.frame_size,
            hop_size: self.hop_size,
            sample_rate: self.sample_rate,
            frames,
        }
    }
}

/// Reusable forward real FFT of a fixed size with its window
struct FrameTransform {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl FrameTransform {
    fn new(frame_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        FrameTransform {
            fft: planner.plan_fft_forward(frame_size),
            window: hann_window(frame_size),
        }
    }

    /// Window a frame and return its magnitude spectrum
    fn magnitudes(&self, frame: &[f32]) -> Vec<f32> {
        let mut input: Vec<f32> = frame
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| s * w)
            .collect();
        let mut spectrum = self.fft.make_output_vec();

        match self.fft.process(&mut input, &mut spectrum) {
            Ok(()) => spectrum.iter().map(|c| c.norm()).collect(),
            Err(e) => {
                // Only reachable on a length mismatch, which the framing rules out
                log::warn!("FFT failed on a {}-sample frame: {}", frame.len(), e);
                vec![0.0; spectrum.len()]
            }
        }
    }
}

/// Centered magnitude STFT.
///
/// The signal is zero-padded by `frame_size / 2` on both sides so frame `t`
/// is centered on sample `t * hop_size`; this yields `1 + len / hop` frames.
/// An empty signal yields an empty spectrogram.
pub fn magnitude_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
) -> Spectrogram {
    let frame_size = frame_size.max(2);
    let hop_size = hop_size.max(1);

    if samples.is_empty() {
        return Spectrogram {
            frame_size,
            hop_size,
            sample_rate,
            frames: Vec::new(),
        };
    }

    let pad = frame_size / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let num_frames = 1 + samples.len() / hop_size;
    let transform = FrameTransform::new(frame_size);
    let mut frames = Vec::with_capacity(num_frames);
    let mut frame = vec![0.0f32; frame_size];

    for t in 0..num_frames {
        let start = t * hop_size;
        let end = (start + frame_size).min(padded.len());
        let available = end.saturating_sub(start);

        frame.iter_mut().for_each(|s| *s = 0.0);
        if available > 0 {
            frame[..available].copy_from_slice(&padded[start..end]);
        }

        frames.push(transform.magnitudes(&frame));
    }

    Spectrogram {
        frame_size,
        hop_size,
        sample_rate,
        frames,
    }
}

/// Per-frame spectral centroid in Hz (0.0 for frames with no energy)
pub fn spectral_centroid(spec: &Spectrogram) -> Vec<f32> {
    let freqs = spec.frequencies();
    spec.frames()
        .iter()
        .map(|frame| {
            let mut weighted_sum = 0.0f64;
            let mut total_magnitude = 0.0f64;
            for (&magnitude, &frequency) in frame.iter().zip(freqs.iter()) {
                weighted_sum += frequency as f64 * magnitude as f64;
                total_magnitude += magnitude as f64;
            }
            if total_magnitude > 0.0 {
                (weighted_sum / total_magnitude) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Mean magnitude over every frame and every bin whose frequency is in `[low_hz, high_hz)`.
/// Returns 0.0 when no bin falls in the band.
pub fn band_mean_magnitude(spec: &Spectrogram, low_hz: f32, high_hz: f32) -> f32 {
    let bins: Vec<usize> = (0..spec.num_bins())
        .filter(|&k| {
            let f = spec.bin_frequency(k);
            f >= low_hz && f < high_hz
        })
        .collect();

    if bins.is_empty() || spec.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0f64;
    for frame in spec.frames() {
        for &k in &bins {
            sum += frame[k] as f64;
        }
    }

    (sum / (bins.len() * spec.num_frames()) as f64) as f32
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above
pub fn hz_to_mel(hz: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / mel_log_step()
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * (mel_log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

fn mel_log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// One triangular mel filter stored sparsely from its first nonzero bin
#[derive(Debug, Clone)]
struct MelBand {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Triangular mel filterbank over the bins of one STFT size.
///
/// Bands span 0 Hz to Nyquist with area normalization, so a flat spectrum
/// stays flat and narrow low bands are not drowned out by wide high ones.
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    bands: Vec<MelBand>,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, frame_size: usize, num_bands: usize) -> Self {
        let num_bins = frame_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let bin_hz = if frame_size == 0 {
            0.0
        } else {
            sample_rate as f32 / frame_size as f32
        };

        let max_mel = hz_to_mel(nyquist);
        let edges: Vec<f32> = (0..num_bands + 2)
            .map(|i| mel_to_hz(max_mel * i as f32 / (num_bands + 1) as f32))
            .collect();

        let bands = edges
            .windows(3)
            .map(|edge| {
                let (lower, center, upper) = (edge[0], edge[1], edge[2]);
                if upper <= lower || bin_hz <= 0.0 {
                    return MelBand {
                        first_bin: 0,
                        weights: Vec::new(),
                    };
                }

                let norm = 2.0 / (upper - lower);
                let first_bin = (lower / bin_hz).ceil() as usize;
                let last_bin = (upper / bin_hz).floor() as usize;
                let last_bin = last_bin.min(num_bins.saturating_sub(1));
                let weights = (first_bin..=last_bin)
                    .map(|k| {
                        let f = k as f32 * bin_hz;
                        let rising = (f - lower) / (center - lower).max(f32::EPSILON);
                        let falling = (upper - f) / (upper - center).max(f32::EPSILON);
                        rising.min(falling).max(0.0) * norm
                    })
                    .collect();

                MelBand { first_bin, weights }
            })
            .collect();

        MelFilterbank { bands }
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Project one magnitude frame onto the bands as power. `out` must hold `num_bands()` values.
    pub fn project_power(&self, magnitudes: &[f32], out: &mut [f32]) {
        for (band, slot) in self.bands.iter().zip(out.iter_mut()) {
            *slot = band
                .weights
                .iter()
                .zip(magnitudes.iter().skip(band.first_bin))
                .map(|(&w, &m)| w * m * m)
                .sum();
        }
    }
}
