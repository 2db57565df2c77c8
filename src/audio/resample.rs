// Fixed-rate downsampling for key analysis
// FFT resampler (rubato) with a linear-interpolation fallback

use rubato::{FftFixedInOut, Resampler};

/// Analysis rate used by the key estimator
pub const KEY_ANALYSIS_RATE: u32 = 22050;

const CHUNK_SIZE: usize = 1024;

/// Resample mono samples from `from_rate` to `to_rate`.
/// Identical rates return a copy.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let mut resampler =
        match FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Resampler init failed ({}), using linear fallback", e);
                return resample_linear(samples, from_rate, to_rate);
            }
        };

    let input_frames = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let wanted = delay + expected_len;
    let mut output = Vec::with_capacity(wanted + resampler.output_frames_max());

    let mut pos = 0;
    while pos < samples.len() || output.len() < wanted {
        let result = if pos < samples.len() {
            let end = (pos + input_frames).min(samples.len());
            let chunk: [&[f32]; 1] = [&samples[pos..end]];
            if end - pos == input_frames {
                resampler.process(&chunk[..], None)
            } else {
                resampler.process_partial(Some(&chunk[..]), None)
            }
        } else {
            // Input exhausted; flush the delay line
            resampler.process_partial(None::<&[&[f32]]>, None)
        };

        match result {
            Ok(resampled) => match resampled.first() {
                Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
                _ => break,
            },
            Err(e) => {
                log::debug!("Resampler failed ({}), using linear fallback", e);
                return resample_linear(samples, from_rate, to_rate);
            }
        }

        pos += input_frames;
    }

    // Leading samples are the resampler's delay; trailing ones come from chunk padding
    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    output
}

/// Linear interpolation resampler; may alias when downsampling
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let step = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / step) as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            if idx + 1 < samples.len() {
                samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
            } else {
                samples[idx.min(samples.len() - 1)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050), samples);
    }

    #[test]
    fn test_downsample_length() {
        let samples = vec![0.0f32; 44100];
        let out = resample(&samples, 44100, 22050);
        assert!((out.len() as i64 - 22050).abs() <= 1);
    }

    #[test]
    fn test_downsample_preserves_low_tone() {
        let sr = 44100;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let out = resample(&samples, sr as u32, 22050);

        // Energy of a tone well below Nyquist survives
        let rms = (out.iter().map(|s| s * s).sum::<f32>() / out.len() as f32).sqrt();
        assert!(rms > 0.5 && rms < 0.9);
    }

    #[test]
    fn test_downsample_keeps_timing() {
        // Short bump centered one second in
        let sr = 44100usize;
        let mut samples = vec![0.0f32; 2 * sr];
        for i in 0..64 {
            let w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / 64.0).cos());
            samples[sr - 32 + i] = w;
        }

        let out = resample(&samples, sr as u32, 22050);
        let (peak, _) = out
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        assert!((peak as i64 - 22050).abs() <= 2, "peak at {}", peak);
    }

    #[test]
    fn test_downsample_keeps_tail() {
        let sr = 44100;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let out = resample(&samples, sr as u32, 22050);
        assert_eq!(out.len(), 22050);

        let tail = &out[out.len() - 200..];
        let rms = (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt();
        assert!(rms > 0.5, "tail rms {}", rms);
    }

    #[test]
    fn test_linear_fallback() {
        let out = resample_linear(&[0.0, 1.0, 2.0, 3.0], 4, 2);
        assert_eq!(out, vec![0.0, 2.0]);
        assert!(resample_linear(&[], 4, 2).is_empty());
    }
}
