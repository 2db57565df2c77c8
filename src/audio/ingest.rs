// Audio ingestion module
// Reads WAV stems into normalized samples and writes sliced fragments back out

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to open {path}: {source}")]
    OpenError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples normalized to f32 in range [-1.0, 1.0], interleaved
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Duration in milliseconds
    pub duration_ms: i64,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Get duration in seconds as f64
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Collapse to the mono analysis representation
    pub fn to_waveform(&self) -> Waveform {
        Waveform::new(self.to_mono(), self.sample_rate)
    }
}

/// Mono waveform handed to the analysis core.
/// Immutable once built; every analysis step borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Waveform {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds (0.0 for a zero sample rate)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        peak_amplitude(&self.samples)
    }
}

/// Largest absolute sample value of a slice (0.0 when empty)
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    decode(WavReader::new(Cursor::new(data))?)
}

/// Read a WAV file from disk
pub fn read_wav(path: &Path) -> Result<AudioData, AudioError> {
    let file = std::fs::File::open(path).map_err(|source| AudioError::OpenError {
        path: path.display().to_string(),
        source,
    })?;
    let audio = decode(WavReader::new(std::io::BufReader::new(file))?)?;

    log::debug!(
        "Read {}: {} Hz, {} channels, {} bit, {} ms",
        path.display(),
        audio.sample_rate,
        audio.channels,
        audio.bit_depth,
        audio.duration_ms
    );

    Ok(audio)
}

/// Read a WAV file and collapse it to a mono waveform
pub fn read_waveform(path: &Path) -> Result<Waveform, AudioError> {
    Ok(read_wav(path)?.to_waveform())
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<AudioData, AudioError> {
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;
    let sample_format = spec.sample_format;

    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::InvalidData);
    }

    // Read and normalize samples to f32 [-1.0, 1.0]
    let samples: Vec<f32> = match (sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // hound hands 8-bit PCM back already centered on zero
            reader
                .samples::<i8>()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| s as f32 / 128.0)
                .collect()
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 8388608.0)
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 2147483648.0)
            .collect(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                sample_format, bit_depth
            )));
        }
    };

    let frame_count = samples.len() / channels as usize;
    let duration_secs = frame_count as f64 / sample_rate as f64;
    let duration_ms = (duration_secs * 1000.0) as i64;

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        bit_depth,
        duration_ms,
        frame_count,
    })
}

/// Write mono samples as 16-bit PCM WAV
/// Samples are clipped to [-1.0, 1.0] before quantization
pub fn write_wav_pcm16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let clipped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clipped * 32767.0).round() as i16)?;
    }
    writer.finalize()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_audio_data_to_mono() {
        // Create stereo audio: [L, R, L, R, L, R]
        let stereo = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let audio_data = AudioData {
            samples: stereo,
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            duration_ms: 1,
            frame_count: 3,
        };

        let mono = audio_data.to_mono();

        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.15).abs() < 1e-6);
        assert!((mono[1] - 0.35).abs() < 1e-6);
        assert!((mono[2] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_audio_data_duration_secs() {
        let audio_data = AudioData {
            samples: vec![],
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            duration_ms: 5000,
            frame_count: 0,
        };

        assert_eq!(audio_data.duration_secs(), 5.0);
    }

    #[test]
    fn test_waveform_peak_and_duration() {
        let waveform = Waveform::new(vec![0.0, -0.75, 0.5, 0.0], 4);
        assert_eq!(waveform.peak(), 0.75);
        assert_eq!(waveform.duration_secs(), 1.0);
        assert!(!waveform.is_empty());
    }

    #[test]
    fn test_write_then_read_pcm16() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frag.wav");

        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();
        write_wav_pcm16(&path, &samples, 44100).unwrap();

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.bit_depth, 16);
        assert_eq!(audio.frame_count, samples.len());
        for (a, b) in audio.samples.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_write_clips_out_of_range() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("loud.wav");

        write_wav_pcm16(&path, &[2.0, -2.0], 8000).unwrap();
        let audio = read_wav(&path).unwrap();
        assert!(audio.samples[0] > 0.99);
        assert!(audio.samples[1] < -0.99);
    }

    #[test]
    fn test_ingest_rejects_garbage() {
        assert!(ingest_wav(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_wav(Path::new("/nonexistent/stem.wav")).unwrap_err();
        assert!(matches!(err, AudioError::OpenError { .. }));
    }
}
