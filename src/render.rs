//! Audio and PDF rendering
//!
//! MIDI is synthesized with a General MIDI SoundFont through `rustysynth`.
//! MP3 encoding and PDF engraving are delegated to `ffmpeg` and MuseScore,
//! found on `PATH`.

use crate::config::RenderConfig;
use crate::error::{Result as SatbResult, SatbError};
use hound::{WavSpec, WavWriter};
use rustysynth::{MidiFile, MidiFileSequencer, SoundFont, Synthesizer, SynthesizerSettings};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;

const USER_SOUNDFONT_DIR: &str = ".soundfonts";
const USER_SOUNDFONT_NAME: &str = "FluidR3_GM.sf2";

/// Output container for rendered audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(format!("unsupported audio format: {}", other)),
        }
    }
}

/// `~/.soundfonts/FluidR3_GM.sf2`
pub fn user_soundfont_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_SOUNDFONT_DIR).join(USER_SOUNDFONT_NAME))
}

/// First SoundFont that exists among the configured paths and the user directory
pub fn resolve_soundfont(config: &RenderConfig) -> Option<PathBuf> {
    config
        .soundfont_paths
        .iter()
        .cloned()
        .chain(user_soundfont_path())
        .find(|p| p.is_file())
}

/// Download the configured SoundFont into `~/.soundfonts` unless one is already present
pub async fn fetch_soundfont(config: &RenderConfig) -> SatbResult<PathBuf> {
    if let Some(existing) = resolve_soundfont(config) {
        tracing::info!("SoundFont already available at {}", existing.display());
        return Ok(existing);
    }

    let target = user_soundfont_path()
        .ok_or_else(|| SatbError::RenderError("cannot determine home directory".to_string()))?;
    download_to(&config.soundfont_url, &target).await?;
    Ok(target)
}

/// Stream a URL to a file
pub async fn download_to(url: &str, target: &Path) -> SatbResult<()> {
    tracing::info!("Downloading {} to {}", url, target.display());

    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SatbError::RenderError(format!(
            "SoundFont download failed with status {}",
            status
        )));
    }
    let bytes = response.bytes().await?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, &bytes).await?;

    tracing::info!("  ✓ Saved {} bytes", bytes.len());
    Ok(())
}

/// Load a SoundFont from disk
pub fn load_soundfont(path: &Path) -> SatbResult<Arc<SoundFont>> {
    let bytes = std::fs::read(path)?;
    let mut cursor = Cursor::new(bytes);
    let sound_font = SoundFont::new(&mut cursor).map_err(|e| {
        SatbError::RenderError(format!("Failed to load SoundFont {}: {:?}", path.display(), e))
    })?;
    Ok(Arc::new(sound_font))
}

/// Synthesize a MIDI file to 16-bit stereo WAV bytes
pub fn render_midi_to_wav(
    midi_bytes: &[u8],
    sound_font: &Arc<SoundFont>,
    sample_rate: u32,
    tail_sec: f64,
) -> SatbResult<Vec<u8>> {
    let mut midi_cursor = Cursor::new(midi_bytes);
    let midi = Arc::new(
        MidiFile::new(&mut midi_cursor)
            .map_err(|e| SatbError::RenderError(format!("Failed to parse MIDI file: {:?}", e)))?,
    );

    let settings = SynthesizerSettings::new(sample_rate as i32);
    let synthesizer = Synthesizer::new(sound_font, &settings)
        .map_err(|e| SatbError::RenderError(format!("Failed to create synthesizer: {:?}", e)))?;

    let mut sequencer = MidiFileSequencer::new(synthesizer);
    sequencer.play(&midi, false);

    let total_time = midi.get_length() + tail_sec.max(0.0);
    let sample_count = (sample_rate as f64 * total_time) as usize;

    let mut left = vec![0f32; sample_count];
    let mut right = vec![0f32; sample_count];
    sequencer.render(&mut left[..], &mut right[..]);

    samples_to_wav(&left, &right, sample_rate)
}

/// Interleave two channels into 16-bit WAV bytes
pub fn samples_to_wav(left: &[f32], right: &[f32], sample_rate: u32) -> SatbResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| SatbError::RenderError(format!("WAV encoding failed: {}", e));

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
    for (&l, &r) in left.iter().zip(right) {
        writer
            .write_sample((l.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .map_err(wav_err)?;
        writer
            .write_sample((r.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;

    Ok(cursor.into_inner())
}

/// Locate the configured ffmpeg binary
pub fn find_ffmpeg(config: &RenderConfig) -> Option<PathBuf> {
    which::which(&config.ffmpeg_bin).ok()
}

/// Locate the first available MuseScore binary
pub fn find_musescore(config: &RenderConfig) -> Option<PathBuf> {
    config
        .musescore_bins
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Encode a WAV file as MP3 with ffmpeg
pub fn wav_to_mp3(wav_path: &Path, mp3_path: &Path, config: &RenderConfig) -> SatbResult<()> {
    let ffmpeg = find_ffmpeg(config).ok_or_else(|| {
        SatbError::RenderError(format!("{} not found on PATH", config.ffmpeg_bin))
    })?;

    let output = Command::new(&ffmpeg)
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(wav_path)
        .args(["-q:a", "2"])
        .arg(mp3_path)
        .output()?;

    if !output.status.success() {
        return Err(SatbError::RenderError(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Render a MIDI file to WAV or MP3, chosen by the output extension
pub fn render_audio(
    midi_path: &Path,
    out_path: &Path,
    sound_font: &Arc<SoundFont>,
    config: &RenderConfig,
) -> SatbResult<PathBuf> {
    let format = AudioFormat::from_path(out_path).ok_or_else(|| {
        SatbError::RenderError(format!("unsupported audio output {}", out_path.display()))
    })?;

    let midi_bytes = std::fs::read(midi_path)?;
    let wav = render_midi_to_wav(&midi_bytes, sound_font, config.sample_rate, config.tail_sec)?;
    write_audio(&wav, out_path, format, config)?;
    Ok(out_path.to_path_buf())
}

/// Write rendered WAV bytes as the requested format
pub fn write_audio(wav: &[u8], out_path: &Path, format: AudioFormat, config: &RenderConfig) -> SatbResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match format {
        AudioFormat::Wav => std::fs::write(out_path, wav)?,
        AudioFormat::Mp3 => {
            // Intermediate WAV is removed when the handle drops
            let temp = tempfile::Builder::new()
                .prefix("satb_render_")
                .suffix(".wav")
                .tempfile()?;
            std::fs::write(temp.path(), wav)?;
            wav_to_mp3(temp.path(), out_path, config)?;
        }
    }
    Ok(())
}

/// Engrave a MusicXML file to PDF with MuseScore
pub fn musicxml_to_pdf(xml_path: &Path, pdf_path: &Path, config: &RenderConfig) -> SatbResult<PathBuf> {
    let musescore = find_musescore(config).ok_or_else(|| {
        SatbError::RenderError(format!(
            "MuseScore not found (tried {})",
            config.musescore_bins.join(", ")
        ))
    })?;

    let output = Command::new(&musescore)
        .arg("-o")
        .arg(pdf_path)
        .arg(xml_path)
        .env("QT_QPA_PLATFORM", "offscreen")
        .output()?;

    if !output.status.success() || !pdf_path.exists() {
        return Err(SatbError::RenderError(format!(
            "MuseScore failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    tracing::info!("Rendered PDF {}", pdf_path.display());
    Ok(pdf_path.to_path_buf())
}
