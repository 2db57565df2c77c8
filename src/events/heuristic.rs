// Heuristic (rule-based) drum-hit classifier
// Classifies drum-stem fragments from three band energies and the spectral centroid

use crate::audio::ingest::peak_amplitude;
use crate::audio::spectrum::{self, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use crate::events::types::{BandFeatures, DrumClass};
use crate::onset::detect::SILENCE_FLOOR;

/// Band edges in Hz, lower bound inclusive
pub const LOW_BAND: (f32, f32) = (20.0, 150.0);
pub const MID_BAND: (f32, f32) = (150.0, 2000.0);
pub const HIGH_BAND: (f32, f32) = (2000.0, 12000.0);

/// Hat: high band must exceed mid band by this factor
const HAT_HIGH_OVER_MID: f32 = 1.2;
const HAT_MIN_CENTROID: f32 = 3500.0;

/// Kick: low band must exceed this fraction of the mid band
const KICK_LOW_OVER_MID: f32 = 0.9;
const KICK_MAX_CENTROID: f32 = 1200.0;

const SNARE_MIN_CENTROID: f32 = 900.0;
const SNARE_MAX_CENTROID: f32 = 3500.0;

/// STFT hop as a divisor of the frame size
const HOP_DIVISOR: usize = 8;

/// Classification outcome together with the features it was decided on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub class: DrumClass,
    pub features: BandFeatures,
}

/// Compute band energies and mean centroid of a fragment.
/// Empty or silent input yields all-zero features.
pub fn band_features(samples: &[f32], sample_rate: u32) -> BandFeatures {
    if samples.is_empty() || sample_rate == 0 || peak_amplitude(samples) < SILENCE_FLOOR {
        return BandFeatures::zero();
    }

    let frame_size = spectrum::frame_size_for(samples.len(), MAX_FRAME_SIZE, MIN_FRAME_SIZE);
    let hop_size = (frame_size / HOP_DIVISOR).max(1);
    let spec = spectrum::magnitude_spectrogram(samples, sample_rate, frame_size, hop_size);
    if spec.is_empty() {
        return BandFeatures::zero();
    }

    let centroids = spectrum::spectral_centroid(&spec);
    let centroid_hz = centroids.iter().sum::<f32>() / centroids.len() as f32;

    BandFeatures {
        low_energy: spectrum::band_mean_magnitude(&spec, LOW_BAND.0, LOW_BAND.1),
        mid_energy: spectrum::band_mean_magnitude(&spec, MID_BAND.0, MID_BAND.1),
        high_energy: spectrum::band_mean_magnitude(&spec, HIGH_BAND.0, HIGH_BAND.1),
        centroid_hz,
    }
}

/// Ordered decision rules, first match wins
pub fn decide(f: &BandFeatures) -> DrumClass {
    if f.is_silent() {
        return DrumClass::Other;
    }

    if f.high_energy > f.mid_energy * HAT_HIGH_OVER_MID && f.centroid_hz > HAT_MIN_CENTROID {
        return DrumClass::Hat;
    }

    if f.low_energy > f.mid_energy * KICK_LOW_OVER_MID && f.centroid_hz < KICK_MAX_CENTROID {
        return DrumClass::Kick;
    }

    if f.mid_energy >= f.low_energy.max(f.high_energy)
        && (SNARE_MIN_CENTROID..=SNARE_MAX_CENTROID).contains(&f.centroid_hz)
    {
        return DrumClass::Snare;
    }

    DrumClass::Other
}

/// Classify one fragment
pub fn classify(samples: &[f32], sample_rate: u32) -> ClassificationResult {
    let features = band_features(samples, sample_rate);
    ClassificationResult {
        class: decide(&features),
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    /// Sine burst with short linear ramps so the edges do not smear energy upward
    fn tone_burst(freq: f32, duration_s: f32) -> Vec<f32> {
        let len = (duration_s * SR as f32) as usize;
        let ramp = (SR as usize / 100).min(len / 4).max(1);
        (0..len)
            .map(|i| {
                let env = if i < ramp {
                    i as f32 / ramp as f32
                } else if i >= len - ramp {
                    (len - 1 - i) as f32 / ramp as f32
                } else {
                    1.0
                };
                0.8 * env * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_kick_decision() {
        let features = BandFeatures {
            low_energy: 5.0,
            mid_energy: 1.0,
            high_energy: 0.1,
            centroid_hz: 300.0,
        };
        assert_eq!(decide(&features), DrumClass::Kick);
    }

    #[test]
    fn test_hat_wins_over_later_rules() {
        // Also satisfies nothing else, but hat is checked first
        let features = BandFeatures {
            low_energy: 0.0,
            mid_energy: 1.0,
            high_energy: 1.3,
            centroid_hz: 6000.0,
        };
        assert_eq!(decide(&features), DrumClass::Hat);
    }

    #[test]
    fn test_snare_decision_bounds() {
        let mut features = BandFeatures {
            low_energy: 0.5,
            mid_energy: 2.0,
            high_energy: 1.0,
            centroid_hz: 900.0,
        };
        assert_eq!(decide(&features), DrumClass::Snare);

        features.centroid_hz = 3500.0;
        assert_eq!(decide(&features), DrumClass::Snare);

        features.centroid_hz = 3600.0;
        assert_eq!(decide(&features), DrumClass::Other);
    }

    #[test]
    fn test_bright_but_mid_heavy_is_other() {
        let features = BandFeatures {
            low_energy: 0.1,
            mid_energy: 2.0,
            high_energy: 2.1,
            centroid_hz: 5000.0,
        };
        assert_eq!(decide(&features), DrumClass::Other);
    }

    #[test]
    fn test_low_sine_is_kick() {
        let result = classify(&tone_burst(80.0, 0.25), SR);
        assert_eq!(result.class, DrumClass::Kick);
        assert!(result.features.low_energy > result.features.mid_energy);
    }

    #[test]
    fn test_high_sine_is_hat() {
        let result = classify(&tone_burst(8000.0, 0.25), SR);
        assert_eq!(result.class, DrumClass::Hat);
        assert!(result.features.centroid_hz > 3500.0);
    }

    #[test]
    fn test_mid_sine_is_snare() {
        let result = classify(&tone_burst(1500.0, 0.25), SR);
        assert_eq!(result.class, DrumClass::Snare);
    }

    #[test]
    fn test_silence_and_empty_are_other() {
        assert_eq!(classify(&[0.0; 4096], SR).class, DrumClass::Other);
        assert_eq!(classify(&[], SR).class, DrumClass::Other);
        assert_eq!(classify(&[0.5; 4096], 0).class, DrumClass::Other);
    }

    #[test]
    fn test_short_fragment_does_not_panic() {
        let result = classify(&tone_burst(1500.0, 0.002), SR);
        assert!(DrumClass::ALL.contains(&result.class));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let burst = tone_burst(200.0, 0.1);
        assert_eq!(classify(&burst, SR), classify(&burst, SR));
    }
}
