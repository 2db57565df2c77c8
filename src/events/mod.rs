// Drum-hit classification module
// Band-energy features and the rule-based kick/snare/hat/other classifier

pub mod heuristic;
pub mod types;

pub use heuristic::{band_features, classify, decide, ClassificationResult};
pub use types::{BandFeatures, DrumClass, DrumCounts};
