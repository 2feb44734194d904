//! Audio I/O and basic processing functionality

use crate::analysis::{OnsetAssignment, PitchPeak, Score};
use crate::config::Config;
use crate::error::{Result as SatbResult, SatbError};
use crate::pitch::KeyDetection;
use crate::spectral::StftData;
use hound::WavReader;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Onset event detected during onset detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnsetEvent {
    /// Time in seconds
    pub time_sec: f32,
    /// Frame index in spectrogram
    pub frame_idx: usize,
    /// Normalized onset strength
    pub strength: f32,
}

/// Audio state carrying loaded samples and the products of every pass
#[derive(Debug, Clone)]
pub struct AudioState {
    /// Audio samples (mono, normalized to [-1, 1])
    pub y: Vec<f32>,
    /// Sample rate in Hz
    pub sr: u32,
    /// Configuration reference
    pub config: Config,
    /// Title used in exported scores (input file stem)
    pub title: String,

    // Pass 0: Preflight
    pub y_processed: Option<Vec<f32>>,

    // Pass 1: Spectral analysis
    pub stft: Option<StftData>,
    pub magnitude: Option<Array2<f32>>,
    /// Harmonic component (or the full magnitude when separation is off)
    pub harmonic: Option<Array2<f32>>,
    pub freqs: Vec<f32>,

    // Pass 2: Onset detection
    pub onset_envelope: Vec<f32>,
    pub onsets: Vec<OnsetEvent>,

    // Pass 3: Pitch tracking
    pub pitch_frames: Vec<Vec<PitchPeak>>,

    // Pass 4: Voice assignment (`None` until the pass has run)
    pub assignments: Option<Vec<OnsetAssignment>>,

    // Pass 5: Score assembly
    pub key: Option<KeyDetection>,
    pub score: Option<Score>,
}

impl AudioState {
    /// Load audio file and create initial state
    pub fn load<P: AsRef<Path>>(path: P, config: &Config) -> SatbResult<Self> {
        let path = path.as_ref();
        let (y, sr) = load_audio_file(path)?;
        let mut state = Self::from_samples(y, sr, config);
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            state.title = stem.to_string();
        }
        Ok(state)
    }

    /// Create state from in-memory mono samples
    pub fn from_samples(samples: Vec<f32>, sr: u32, config: &Config) -> Self {
        AudioState {
            y: samples,
            sr,
            config: config.clone(),
            title: "Untitled".to_string(),
            y_processed: None,
            stft: None,
            magnitude: None,
            harmonic: None,
            freqs: Vec::new(),
            onset_envelope: Vec::new(),
            onsets: Vec::new(),
            pitch_frames: Vec::new(),
            assignments: None,
            key: None,
            score: None,
        }
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sr == 0 {
            return 0.0;
        }
        self.y.len() as f32 / self.sr as f32
    }
}

/// Load audio file and return mono samples with sample rate
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> SatbResult<(Vec<f32>, u32)> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => load_wav_file(path),
        "mp3" | "ogg" | "flac" | "webm" => load_compressed_file(path, &extension),
        _ => Err(SatbError::InvalidAudioFormat(format!(
            "Unsupported audio format: {}",
            extension
        ))),
    }
}

/// Load WAV file
fn load_wav_file(path: &Path) -> SatbResult<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path).map_err(|e| SatbError::AudioFileError(e.to_string()))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(SatbError::InvalidAudioFormat("WAV declares zero channels".to_string()));
    }
    if spec.bits_per_sample > 32 {
        return Err(SatbError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| SatbError::AudioFileError(e.to_string()))? as f32
                    / max_value;
                samples.push(sample);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample.map_err(|e| SatbError::AudioFileError(e.to_string()))?);
            }
        }
    }

    Ok((downmix(&samples, spec.channels as usize), spec.sample_rate))
}

/// Decode MP3/OGG/FLAC/WebM with symphonia
fn load_compressed_file(path: &Path, extension: &str) -> SatbResult<(Vec<f32>, u32)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SatbError::DecodeError(format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SatbError::DecodeError("no audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SatbError::DecodeError("stream has no sample rate".to_string()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SatbError::DecodeError(format!("failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(SatbError::DecodeError(format!("failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt frames are skipped rather than aborting the whole file
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => {
                return Err(SatbError::DecodeError(format!("failed to decode packet: {}", e)));
            }
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    Ok((downmix(&interleaved, channels.max(1)), sample_rate))
}

/// Average interleaved channels to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Validate audio file format and content
pub fn validate_audio_file<P: AsRef<Path>>(path: P, config: &Config) -> SatbResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(SatbError::InputValidationError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    let (samples, sr) = load_audio_file(path)?;
    validate_samples(&samples, sr, config)
}

/// Check sample rate, length and duration bounds
pub fn validate_samples(samples: &[f32], sr: u32, config: &Config) -> SatbResult<()> {
    if !(8000..=192000).contains(&sr) {
        return Err(SatbError::UnsupportedSampleRate(sr));
    }

    if samples.is_empty() {
        return Err(SatbError::InputValidationError(
            "Audio file contains no samples".to_string(),
        ));
    }

    let duration_sec = samples.len() as f32 / sr as f32;
    if duration_sec < config.audio.min_duration_sec {
        return Err(SatbError::InputValidationError(format!(
            "Audio file too short: {:.2}s (minimum {:.2}s)",
            duration_sec, config.audio.min_duration_sec
        )));
    }

    if duration_sec > config.audio.max_duration_sec {
        return Err(SatbError::InputValidationError(format!(
            "Audio file too long: {:.1}s (maximum {:.1}s)",
            duration_sec, config.audio.max_duration_sec
        )));
    }

    Ok(())
}

/// Absolute peak of a signal
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

/// Root-mean-square level of a signal
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Scale a signal so its absolute peak equals `target`; silence is returned unchanged
pub fn normalize_peak(samples: &[f32], target: f32) -> Vec<f32> {
    let p = peak(samples);
    if p < 1e-9 {
        return samples.to_vec();
    }
    let gain = target / p;
    samples.iter().map(|&x| x * gain).collect()
}
