// Tonal analysis module
// Pitch (YIN) and key (chroma template correlation) estimation

pub mod chroma;
pub mod key;
pub mod pitch;

pub use key::{best_key_from_chroma, estimate_key, key_label, Key, Mode};
pub use pitch::{estimate_pitch, hz_to_note_name, PitchEstimate, NA_LABEL};
