//! SATB Transcription System
//!
//! Turns a recording into four-part (Soprano, Alto, Tenor, Bass) sheet music.
//! Onsets are detected on the spectrogram, the strongest pitches at each onset
//! are placed greedily into fixed vocal ranges, and the result is exported as
//! MIDI, MusicXML or PDF with optional solfège lyrics and rendered audio.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod musicxml;
pub mod passes;
pub mod pitch;
pub mod qa;
#[cfg(feature = "record")]
pub mod recorder;
pub mod render;
pub mod server;
pub mod services;
pub mod spectral;

pub use analysis::{Score, Voice};
pub use audio::AudioState;
pub use config::Config;
pub use error::{Result as SatbResult, SatbError};
pub use pitch::SolfegeSystem;

use render::AudioFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Generated artifacts keyed by role (`score`, `soprano`, `bass_midi`, `score_audio`, ...)
pub type OutputFiles = BTreeMap<String, PathBuf>;

/// Notation format requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    MusicXml,
    Midi,
    Pdf,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "musicxml" | "xml" => Ok(OutputFormat::MusicXml),
            "midi" | "mid" => Ok(OutputFormat::Midi),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unsupported output format: {}", other)),
        }
    }
}

/// Per-request generation options
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
    pub format: OutputFormat,
    pub solfege: SolfegeSystem,
    pub export_audio: bool,
    /// Defaults to the output directory
    pub audio_dir: Option<PathBuf>,
}

impl GenerateOptions {
    /// Options taken from the `export` section of a configuration
    pub fn from_config(config: &Config) -> SatbResult<Self> {
        Ok(Self {
            output_dir: None,
            format: config
                .export
                .format
                .parse()
                .map_err(SatbError::ConfigValidationFailed)?,
            solfege: config
                .export
                .solfege
                .parse()
                .map_err(SatbError::ConfigValidationFailed)?,
            export_audio: config.export.export_audio,
            audio_dir: None,
        })
    }
}

/// Result of a generation run
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub files: OutputFiles,
    pub basename: String,
    pub score: Score,
}

/// Main processing pipeline for SATB generation
#[derive(Debug, Clone)]
pub struct SatbGenerator {
    config: Config,
}

impl SatbGenerator {
    /// Create a new generator with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transcribe an audio file and write every requested artifact
    pub fn generate<P: AsRef<Path>>(&self, input: P, options: &GenerateOptions) -> SatbResult<GenerationOutput> {
        let input = input.as_ref();
        if !input.is_file() {
            return Err(SatbError::InputValidationError(format!(
                "Input file not found: {}",
                input.display()
            )));
        }

        let basename = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("output")
            .to_string();

        let output_dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        std::fs::create_dir_all(&output_dir)?;

        let mut config = self.config.clone();
        config.export.solfege = options.solfege.as_str().to_string();

        tracing::info!("Processing {}", input.display());
        let mut state = AudioState::load(input, &config)?;
        Self::run_pipeline(&mut state, &config)?;

        let score = state.score.clone().ok_or_else(|| {
            SatbError::ProcessingPipelineError("pipeline produced no score".to_string())
        })?;

        let mut files = midi::export_midi(&score, &output_dir, &basename, config.export.velocity)?;
        self.export_notation(&score, &output_dir, &basename, options.format, &mut files)?;

        let analysis_path = analysis::export_analysis(&state, &output_dir, &basename)?;
        files.insert("analysis".to_string(), analysis_path);

        for (kind, path) in qa::generate_artifacts(&state, &output_dir, &basename, &config.qa)? {
            files.insert(format!("qa_{}", kind), path);
        }

        if options.export_audio {
            let audio_dir = options.audio_dir.clone().unwrap_or_else(|| output_dir.clone());
            self.export_audio(&audio_dir, &basename, &mut files)?;
        }

        tracing::info!("Generated {} files for {}", files.len(), basename);
        Ok(GenerationOutput { files, basename, score })
    }

    /// Transcribe in-memory mono samples without writing anything
    pub fn transcribe_samples(&self, samples: Vec<f32>, sr: u32) -> SatbResult<Score> {
        let mut state = AudioState::from_samples(samples, sr, &self.config);
        Self::run_pipeline(&mut state, &self.config)?;
        state.score.ok_or_else(|| {
            SatbError::ProcessingPipelineError("pipeline produced no score".to_string())
        })
    }

    /// Render chosen parts of a previous generation together into one audio file
    ///
    /// Reads `{basename}_{voice}.mid` from `dir`; the output format follows the
    /// extension of `out_path`.
    pub fn mix(&self, dir: &Path, basename: &str, parts: &[Voice], out_path: &Path) -> SatbResult<PathBuf> {
        if parts.is_empty() {
            return Err(SatbError::InputValidationError("no parts selected".to_string()));
        }

        let mut voices = parts.to_vec();
        voices.sort();
        voices.dedup();

        let mut midi_files = Vec::with_capacity(voices.len());
        for voice in &voices {
            let path = dir.join(format!("{}_{}.mid", basename, voice.name()));
            if !path.is_file() {
                return Err(SatbError::InputValidationError(format!(
                    "Part file not found: {}",
                    path.display()
                )));
            }
            midi_files.push(std::fs::read(&path)?);
        }

        let format = AudioFormat::from_path(out_path).ok_or_else(|| {
            SatbError::InputValidationError(format!(
                "mix output must end in .wav or .mp3: {}",
                out_path.display()
            ))
        })?;

        let render_config = &self.config.render;
        let soundfont_path = render::resolve_soundfont(render_config).ok_or_else(|| {
            SatbError::RenderError("no SoundFont found; run fetch-soundfont first".to_string())
        })?;
        let sound_font = render::load_soundfont(&soundfont_path)?;

        let merged = midi::merge_smf(&midi_files)?;
        let wav = render::render_midi_to_wav(&merged, &sound_font, render_config.sample_rate, render_config.tail_sec)?;
        render::write_audio(&wav, out_path, format, render_config)?;

        let names: Vec<_> = voices.iter().map(|v| v.name()).collect();
        tracing::info!("Mixed {} into {}", names.join(", "), out_path.display());
        Ok(out_path.to_path_buf())
    }

    /// Execute the transcription passes
    fn run_pipeline(state: &mut AudioState, config: &Config) -> SatbResult<()> {
        // Pass 0: Preflight & Normalization
        passes::pass_0::run(state, config)?;

        // Pass 1: Spectral Analysis & Harmonic Separation
        passes::pass_1::run(state, config)?;

        // Pass 2: Onset Detection
        passes::pass_2::run(state, config)?;

        // Pass 3: Pitch Tracking
        passes::pass_3::run(state, config)?;

        // Pass 4: Voice Assignment
        passes::pass_4::run(state, config)?;

        // Pass 5: Score Assembly
        passes::pass_5::run(state, config)?;

        Ok(())
    }

    fn export_notation(
        &self,
        score: &Score,
        output_dir: &Path,
        basename: &str,
        format: OutputFormat,
        files: &mut OutputFiles,
    ) -> SatbResult<()> {
        match format {
            OutputFormat::Midi => {
                for key in std::iter::once("score").chain(Voice::ALL.iter().map(|v| v.name())) {
                    if let Some(path) = files.get(&format!("{}_midi", key)).cloned() {
                        files.insert(key.to_string(), path);
                    }
                }
            }
            OutputFormat::MusicXml => {
                files.extend(musicxml::export_musicxml(score, output_dir, basename)?);
            }
            OutputFormat::Pdf => {
                let xml_files = musicxml::export_musicxml(score, output_dir, basename)?;
                let score_xml = xml_files.get("score").cloned();
                files.extend(xml_files);

                if let Some(xml) = score_xml {
                    files.insert("score_musicxml".to_string(), xml.clone());
                    let pdf = output_dir.join(format!("{}_satb.pdf", basename));
                    match render::musicxml_to_pdf(&xml, &pdf, &self.config.render) {
                        Ok(pdf) => {
                            files.insert("score".to_string(), pdf);
                        }
                        Err(e) => tracing::warn!("PDF not generated, keeping MusicXML: {}", e),
                    }
                }
            }
        }
        Ok(())
    }

    fn export_audio(&self, audio_dir: &Path, basename: &str, files: &mut OutputFiles) -> SatbResult<()> {
        let render_config = &self.config.render;
        let Some(soundfont_path) = render::resolve_soundfont(render_config) else {
            tracing::warn!("No SoundFont found, skipping audio export (run fetch-soundfont)");
            return Ok(());
        };

        let format: AudioFormat = self
            .config
            .export
            .audio_format
            .parse()
            .map_err(SatbError::ConfigValidationFailed)?;
        let sound_font = render::load_soundfont(&soundfont_path)?;
        std::fs::create_dir_all(audio_dir)?;

        let targets = std::iter::once(("score", "satb".to_string()))
            .chain(Voice::ALL.iter().map(|v| (v.name(), v.name().to_string())));

        for (key, suffix) in targets {
            let Some(midi_path) = files.get(&format!("{}_midi", key)).cloned() else {
                continue;
            };
            let out = audio_dir.join(format!("{}_{}.{}", basename, suffix, format.extension()));
            match render::render_audio(&midi_path, &out, &sound_font, render_config) {
                Ok(path) => {
                    files.insert(format!("{}_audio", key), path);
                }
                Err(e) => tracing::warn!("Audio for {} not rendered: {}", key, e),
            }
        }
        Ok(())
    }
}

/// Validate configuration and input files
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> SatbResult<()> {
    audio::validate_audio_file(input_path, config)?;

    config::validate_config(config).map_err(|e| SatbError::ConfigValidationFailed(e.to_string()))?;

    Ok(())
}
