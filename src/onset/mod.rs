// Onset module
// Onset detection and fragment slicing

pub mod detect;
pub mod slice;

pub use detect::{detect_onsets, Onset, OnsetMode, PeakPickConfig};
pub use slice::{detect_and_slice, Fragment, SliceConfig, SliceResult};
