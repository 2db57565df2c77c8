// Drum-hit types
// Defines drum classes, band features, and per-run class counts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a single drum-stem fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumClass {
    /// Low-band dominated with a dark spectrum
    Kick,

    /// Mid-band dominated, centroid between 900 and 3500 Hz
    Snare,

    /// Bright, high-band dominated noise
    Hat,

    /// Anything the rules do not claim (toms, cymbal swells, silence)
    Other,
}

impl DrumClass {
    pub const ALL: [DrumClass; 4] = [
        DrumClass::Kick,
        DrumClass::Snare,
        DrumClass::Hat,
        DrumClass::Other,
    ];

    /// Lowercase label used in file names and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            DrumClass::Kick => "kick",
            DrumClass::Snare => "snare",
            DrumClass::Hat => "hat",
            DrumClass::Other => "other",
        }
    }
}

impl fmt::Display for DrumClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrumClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kick" => Ok(DrumClass::Kick),
            "snare" => Ok(DrumClass::Snare),
            "hat" => Ok(DrumClass::Hat),
            "other" => Ok(DrumClass::Other),
            _ => Err(format!("Unknown drum class: {}", s)),
        }
    }
}

/// Spectral features the drum rules are evaluated on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandFeatures {
    /// Mean magnitude over bins in [20, 150) Hz
    pub low_energy: f32,

    /// Mean magnitude over bins in [150, 2000) Hz
    pub mid_energy: f32,

    /// Mean magnitude over bins in [2000, 12000) Hz
    pub high_energy: f32,

    /// Spectral centroid (Hz) averaged over frames
    pub centroid_hz: f32,
}

impl BandFeatures {
    /// Features of an empty or silent fragment
    pub fn zero() -> Self {
        BandFeatures {
            low_energy: 0.0,
            mid_energy: 0.0,
            high_energy: 0.0,
            centroid_hz: 0.0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.low_energy <= 0.0 && self.mid_energy <= 0.0 && self.high_energy <= 0.0
    }
}

/// Number of fragments assigned to each class in one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrumCounts {
    pub kick: usize,
    pub snare: usize,
    pub hat: usize,
    pub other: usize,
}

impl DrumCounts {
    pub fn record(&mut self, class: DrumClass) {
        match class {
            DrumClass::Kick => self.kick += 1,
            DrumClass::Snare => self.snare += 1,
            DrumClass::Hat => self.hat += 1,
            DrumClass::Other => self.other += 1,
        }
    }

    pub fn get(&self, class: DrumClass) -> usize {
        match class {
            DrumClass::Kick => self.kick,
            DrumClass::Snare => self.snare,
            DrumClass::Hat => self.hat,
            DrumClass::Other => self.other,
        }
    }

    pub fn total(&self) -> usize {
        self.kick + self.snare + self.hat + self.other
    }
}

impl FromIterator<DrumClass> for DrumCounts {
    fn from_iter<I: IntoIterator<Item = DrumClass>>(iter: I) -> Self {
        let mut counts = DrumCounts::default();
        for class in iter {
            counts.record(class);
        }
        counts
    }
}
