// Chroma features
// STFT bins pooled into semitone bands of constant relative width, folded into 12 pitch classes

use crate::audio::spectrum::{self, Spectrogram, MIN_FRAME_SIZE};

/// Lowest semitone center (C1) in Hz
pub const CHROMA_FMIN: f32 = 32.703_196;

/// Seven octaves of semitone bins starting at C1
pub const N_SEMITONES: usize = 84;

/// Largest transform used for chroma; long frames resolve low semitones
pub const MAX_CHROMA_FRAME: usize = 8192;

pub type Chroma = [f32; 12];

/// Mean chroma vector of a mono signal (not normalized across pitch classes).
/// Empty input yields all zeros.
pub fn chroma_profile(samples: &[f32], sample_rate: u32) -> Chroma {
    if samples.is_empty() || sample_rate == 0 {
        return [0.0; 12];
    }

    let frame_size = spectrum::frame_size_for(samples.len(), MAX_CHROMA_FRAME, MIN_FRAME_SIZE);
    let hop_size = (frame_size / 4).max(1);
    let spec = spectrum::magnitude_spectrogram(samples, sample_rate, frame_size, hop_size);

    mean_chroma(&chroma_frames(&spec))
}

/// One max-normalized chroma vector per spectrogram frame
pub fn chroma_frames(spec: &Spectrogram) -> Vec<Chroma> {
    let semitone_of_bin = semitone_map(spec);

    spec.frames()
        .iter()
        .map(|frame| {
            let mut semitone_power = [0.0f64; N_SEMITONES];
            for (k, &mag) in frame.iter().enumerate() {
                if let Some(p) = semitone_of_bin[k] {
                    semitone_power[p] += (mag as f64) * (mag as f64);
                }
            }

            let mut chroma = [0.0f32; 12];
            for (p, &power) in semitone_power.iter().enumerate() {
                chroma[p % 12] += power.sqrt() as f32;
            }

            let max = chroma.iter().cloned().fold(0.0f32, f32::max);
            if max > 0.0 {
                chroma.iter_mut().for_each(|c| *c /= max);
            }
            chroma
        })
        .collect()
}

/// Average chroma over frames
pub fn mean_chroma(frames: &[Chroma]) -> Chroma {
    let mut mean = [0.0f32; 12];
    if frames.is_empty() {
        return mean;
    }

    for frame in frames {
        for (m, &c) in mean.iter_mut().zip(frame.iter()) {
            *m += c;
        }
    }
    let n = frames.len() as f32;
    mean.iter_mut().for_each(|m| *m /= n);
    mean
}

/// Semitone index (0 = C1) for each STFT bin, None outside the pooled range.
/// Each bin goes to its nearest semitone; below about C2 a bin is wider than a
/// semitone even at the largest frame, so some low semitones receive no bin.
fn semitone_map(spec: &Spectrogram) -> Vec<Option<usize>> {
    (0..spec.num_bins())
        .map(|k| {
            let freq = spec.bin_frequency(k);
            if k == 0 || freq <= 0.0 {
                return None;
            }
            let p = (12.0 * (freq / CHROMA_FMIN).log2()).round();
            if p < 0.0 || p >= N_SEMITONES as f32 {
                None
            } else {
                Some(p as usize)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tones(freqs: &[f32], sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs
                    .iter()
                    .map(|f| 0.3 * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    fn argmax(chroma: &Chroma) -> usize {
        chroma
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc })
            .0
    }

    #[test]
    fn test_single_tone_pitch_class() {
        // A4 -> pitch class 9
        let chroma = chroma_profile(&tones(&[440.0], 22050, 22050), 22050);
        assert_eq!(argmax(&chroma), 9);
    }

    #[test]
    fn test_chord_pitch_classes_dominate() {
        // C4, E4, G4
        let chroma = chroma_profile(&tones(&[261.63, 329.63, 392.0], 22050, 22050), 22050);
        let chord = [0usize, 4, 7];
        let weakest_chord_tone = chord.iter().map(|&i| chroma[i]).fold(f32::MAX, f32::min);
        for (i, &c) in chroma.iter().enumerate() {
            if !chord.contains(&i) {
                assert!(c < weakest_chord_tone, "pitch class {} = {}", i, c);
            }
        }
    }

    #[test]
    fn test_frames_are_max_normalized() {
        let samples = tones(&[440.0], 22050, 8192);
        let spec = spectrum::magnitude_spectrogram(&samples, 22050, 4096, 1024);
        for frame in chroma_frames(&spec) {
            let max = frame.iter().cloned().fold(0.0f32, f32::max);
            assert!((max - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_semitone_coverage_at_largest_frame() {
        let spec = spectrum::magnitude_spectrogram(&[0.0; 16], 22050, MAX_CHROMA_FRAME, 2048);
        let mut bins_per_semitone = [0usize; N_SEMITONES];
        for p in semitone_map(&spec).into_iter().flatten() {
            bins_per_semitone[p] += 1;
        }

        // C2 and above: every semitone is resolved
        assert!(bins_per_semitone[12..].iter().all(|&n| n > 0));
        // Lowest octave: bins are coarser than semitones (D#1 falls between bins)
        assert_eq!(bins_per_semitone[3], 0);
    }

    #[test]
    fn test_silence_and_empty() {
        assert_eq!(chroma_profile(&[0.0; 4096], 22050), [0.0; 12]);
        assert_eq!(chroma_profile(&[], 22050), [0.0; 12]);
        assert_eq!(mean_chroma(&[]), [0.0; 12]);
    }
}
