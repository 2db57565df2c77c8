// Audio processing module
// WAV ingestion, spectral analysis, and resampling

pub mod ingest;
pub mod resample;
pub mod spectrum;

pub use ingest::{
    ingest_wav, peak_amplitude, read_wav, read_waveform, write_wav_pcm16, AudioData, AudioError,
    Waveform,
};
pub use resample::{resample, KEY_ANALYSIS_RATE};
pub use spectrum::{frame_size_for, magnitude_spectrogram, Spectrogram};
