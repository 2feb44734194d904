//! Configuration system for the SATB transcriber

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub stft: StftConfig,
    pub hpss: HpssConfig,
    pub onset: OnsetConfig,
    pub pitch: PitchConfig,
    pub voices: VoiceRangesConfig,
    pub rhythm: RhythmConfig,
    pub export: ExportConfig,
    pub render: RenderConfig,
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub recognition: RecognitionConfig,
    pub qa: QaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            stft: StftConfig::default(),
            hpss: HpssConfig::default(),
            onset: OnsetConfig::default(),
            pitch: PitchConfig::default(),
            voices: VoiceRangesConfig::default(),
            rhythm: RhythmConfig::default(),
            export: ExportConfig::default(),
            render: RenderConfig::default(),
            server: ServerConfig::default(),
            services: ServicesConfig::default(),
            recognition: RecognitionConfig::default(),
            qa: QaConfig::default(),
        }
    }
}

/// Audio loading and preflight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Scale the signal so its absolute peak is 1.0 before analysis
    pub normalize: bool,
    pub min_duration_sec: f32,
    pub max_duration_sec: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            min_duration_sec: 0.25,
            max_duration_sec: 3600.0,
        }
    }
}

/// STFT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub window: String,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            window: "hann".to_string(),
        }
    }
}

/// Harmonic/percussive separation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HpssConfig {
    pub enabled: bool,
    /// Median filter length across time (frames)
    pub kernel_harmonic: usize,
    /// Median filter length across frequency (bins)
    pub kernel_percussive: usize,
    /// Soft mask exponent
    pub power: f32,
}

impl Default for HpssConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_harmonic: 31,
            kernel_percussive: 31,
            power: 2.0,
        }
    }
}

/// Onset peak-picking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub pre_max_sec: f32,
    pub post_max_sec: f32,
    pub pre_avg_sec: f32,
    pub post_avg_sec: f32,
    /// Threshold above the local mean on the [0, 1] normalized envelope
    pub delta: f32,
    /// Minimum spacing between onsets
    pub wait_sec: f32,
    /// Dynamic range of the log spectrogram used for the envelope
    pub db_range: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            pre_max_sec: 0.03,
            post_max_sec: 0.0,
            pre_avg_sec: 0.10,
            post_avg_sec: 0.10,
            delta: 0.07,
            wait_sec: 0.03,
            db_range: 80.0,
        }
    }
}

/// Pitch tracking and candidate selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub fmin: f32,
    pub fmax: f32,
    /// Peak must exceed this fraction of the frame maximum
    pub peak_threshold: f32,
    /// Absolute magnitude floor for a voice candidate (amplitude units)
    pub min_magnitude: f32,
    /// Lowest MIDI pitch considered for any voice
    pub satb_low: u8,
    /// Highest MIDI pitch considered for any voice
    pub satb_high: u8,
    /// Maximum simultaneous pitches per onset
    pub max_voices: usize,
    /// Keep only the strongest candidate per MIDI pitch
    pub dedupe: bool,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            fmin: 60.0,
            fmax: 2000.0,
            peak_threshold: 0.1,
            min_magnitude: 0.01,
            satb_low: 36,
            satb_high: 83,
            max_voices: 4,
            dedupe: true,
        }
    }
}

/// Inclusive MIDI range for one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub low: u8,
    pub high: u8,
}

/// Vocal ranges for the four voices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceRangesConfig {
    pub soprano: RangeConfig,
    pub alto: RangeConfig,
    pub tenor: RangeConfig,
    pub bass: RangeConfig,
}

impl Default for VoiceRangesConfig {
    fn default() -> Self {
        Self {
            soprano: RangeConfig { low: 60, high: 83 }, // C4-B5
            alto: RangeConfig { low: 53, high: 76 },    // F3-E5
            tenor: RangeConfig { low: 48, high: 69 },   // C3-A4
            bass: RangeConfig { low: 36, high: 60 },    // C2-C4
        }
    }
}

/// Note duration model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmMode {
    /// Every onset becomes one quarter note
    Quarter,
    /// Each event lasts until the next onset, snapped to common lengths
    InterOnset,
}

/// Rhythm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    pub mode: RhythmMode,
    pub tempo_bpm: f32,
    pub beats_per_measure: u8,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            mode: RhythmMode::Quarter,
            tempo_bpm: 120.0,
            beats_per_measure: 4,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// "musicxml", "midi" or "pdf"
    pub format: String,
    /// "none", "fixed" or "movable"
    pub solfege: String,
    pub export_audio: bool,
    /// "mp3" or "wav"
    pub audio_format: String,
    pub velocity: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: "musicxml".to_string(),
            solfege: "none".to_string(),
            export_audio: true,
            audio_format: "mp3".to_string(),
            velocity: 80,
        }
    }
}

/// External renderers and soundfont lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub soundfont_paths: Vec<PathBuf>,
    pub soundfont_url: String,
    pub sample_rate: u32,
    /// Seconds rendered after the last note
    pub tail_sec: f64,
    pub ffmpeg_bin: String,
    pub musescore_bins: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            soundfont_paths: vec![
                PathBuf::from("/usr/share/sounds/sf2/FluidR3_GM.sf2"),
                PathBuf::from("/usr/share/soundfonts/FluidR3_GM.sf2"),
                PathBuf::from("/usr/share/sounds/sf2/default.sf2"),
            ],
            soundfont_url: "https://archive.org/download/FluidR3GM/FluidR3GM.sf2".to_string(),
            sample_rate: 44100,
            tail_sec: 2.0,
            ffmpeg_bin: "ffmpeg".to_string(),
            musescore_bins: vec![
                "mscore".to_string(),
                "musescore".to_string(),
                "mscore4portable".to_string(),
                "musescore3".to_string(),
            ],
        }
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub recordings_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("results"),
            audio_dir: PathBuf::from("audio"),
            recordings_dir: PathBuf::from("recordings"),
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Remote service endpoints and polling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub assemblyai_url: String,
    pub audd_url: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub search_limit: u32,
    pub timeout_sec: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
            spotify_api_url: "https://api.spotify.com/v1".to_string(),
            assemblyai_url: "https://api.assemblyai.com/v2".to_string(),
            audd_url: "https://api.audd.io".to_string(),
            poll_interval_ms: 3000,
            max_polls: 200,
            search_limit: 3,
            timeout_sec: 60,
        }
    }
}

/// Song recognition fallback table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Uploaded file name -> song title
    pub known_songs: HashMap<String, String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let mut known_songs = HashMap::new();
        known_songs.insert(
            "Michael_W_Smith_-_Above_All-Powers-www.CeeNaija.com__satb.mp3".to_string(),
            "Michael W. Smith - Above All Powers".to_string(),
        );
        Self { known_songs }
    }
}

/// QA artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    pub generate_images: bool,
    pub image_size: [u32; 2],
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            generate_images: false,
            image_size: [1200, 600],
        }
    }
}

const FORMATS: [&str; 3] = ["musicxml", "midi", "pdf"];
const SOLFEGE: [&str; 3] = ["none", "fixed", "movable"];
const AUDIO_FORMATS: [&str; 2] = ["mp3", "wav"];

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if !config.stft.n_fft.is_power_of_two() || config.stft.n_fft < 256 {
        anyhow::bail!("stft.n_fft must be a power of two >= 256");
    }
    if config.stft.hop_length == 0 || config.stft.hop_length > config.stft.n_fft {
        anyhow::bail!("stft.hop_length must be in 1..=n_fft");
    }
    if config.pitch.fmin <= 0.0 || config.pitch.fmin >= config.pitch.fmax {
        anyhow::bail!("pitch.fmin must be > 0 and < pitch.fmax");
    }
    if config.pitch.satb_low > config.pitch.satb_high || config.pitch.satb_high > 127 {
        anyhow::bail!("pitch.satb_low..=satb_high must be a valid MIDI span");
    }
    if config.pitch.max_voices == 0 {
        anyhow::bail!("pitch.max_voices must be at least 1");
    }
    for (name, range) in [
        ("soprano", config.voices.soprano),
        ("alto", config.voices.alto),
        ("tenor", config.voices.tenor),
        ("bass", config.voices.bass),
    ] {
        if range.low > range.high || range.high > 127 {
            anyhow::bail!("voices.{} range is invalid ({}..={})", name, range.low, range.high);
        }
    }
    if config.hpss.enabled && (config.hpss.kernel_harmonic == 0 || config.hpss.kernel_percussive == 0) {
        anyhow::bail!("hpss kernels must be non-zero");
    }
    if config.rhythm.tempo_bpm <= 0.0 {
        anyhow::bail!("rhythm.tempo_bpm must be positive");
    }
    if config.rhythm.beats_per_measure == 0 {
        anyhow::bail!("rhythm.beats_per_measure must be positive");
    }
    if !FORMATS.contains(&config.export.format.as_str()) {
        anyhow::bail!("export.format must be one of {:?}", FORMATS);
    }
    if !SOLFEGE.contains(&config.export.solfege.as_str()) {
        anyhow::bail!("export.solfege must be one of {:?}", SOLFEGE);
    }
    if !AUDIO_FORMATS.contains(&config.export.audio_format.as_str()) {
        anyhow::bail!("export.audio_format must be one of {:?}", AUDIO_FORMATS);
    }
    if config.export.velocity == 0 || config.export.velocity > 127 {
        anyhow::bail!("export.velocity must be in 1..=127");
    }
    if config.audio.min_duration_sec >= config.audio.max_duration_sec {
        anyhow::bail!("audio duration bounds are inverted");
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "pitch": { "fmin": 80.0 }, "rhythm": { "mode": "inter_onset" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pitch.fmin, 80.0);
        assert_eq!(config.pitch.fmax, 2000.0);
        assert_eq!(config.rhythm.mode, RhythmMode::InterOnset);
        assert_eq!(config.voices.soprano, RangeConfig { low: 60, high: 83 });
    }

    #[test]
    fn test_rejects_bad_format() {
        let mut config = Config::default();
        config.export.format = "png".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_inverted_voice_range() {
        let mut config = Config::default();
        config.voices.alto = RangeConfig { low: 70, high: 50 };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.export.solfege = "movable".to_string();
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.export.solfege, "movable");
    }
}
