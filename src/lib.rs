// Stem Slicer - stem post-processing for separated audio
// Module declarations

pub mod audio;
pub mod config;
pub mod events;
pub mod onset;
pub mod pipeline;
pub mod state;
pub mod tonal;
pub mod tools;

pub use config::{load_settings, validate_settings, Settings};
pub use events::{DrumClass, DrumCounts};
pub use onset::{detect_and_slice, Fragment, OnsetMode, SliceConfig};
pub use pipeline::{PipelineError, Processor, RunSummary};
pub use tonal::{estimate_key, estimate_pitch, Key, PitchEstimate};
