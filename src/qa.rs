//! QA artifacts generation

use crate::analysis::{Score, Voice};
use crate::audio::AudioState;
use crate::config::QaConfig;
use crate::error::{Result as SatbResult, SatbError};
use crate::spectral::frames_to_time;
use plotters::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

const VOICE_COLORS: [RGBColor; 4] = [
    RGBColor(214, 39, 40),  // soprano
    RGBColor(255, 127, 14), // alto
    RGBColor(44, 160, 44),  // tenor
    RGBColor(31, 119, 180), // bass
];

fn qa_err<E: std::fmt::Debug>(what: &'static str) -> impl Fn(E) -> SatbError {
    move |e| SatbError::QaGenerationError(format!("{}: {:?}", what, e))
}

/// Generate QA plots as `output_dir/qa/{basename}_{kind}.png`
///
/// Returns `(kind, path)` for each written plot; nothing is written unless
/// `qa.generate_images` is set.
pub fn generate_artifacts(
    state: &AudioState,
    output_dir: &Path,
    basename: &str,
    qa: &QaConfig,
) -> SatbResult<Vec<(&'static str, PathBuf)>> {
    if !qa.generate_images {
        return Ok(Vec::new());
    }

    let qa_dir = output_dir.join("qa");
    fs::create_dir_all(&qa_dir)?;

    let size = (qa.image_size[0].max(64), qa.image_size[1].max(64));
    let mut written = Vec::new();

    if let Some(score) = &state.score {
        let path = qa_dir.join(format!("{}_piano_roll.png", basename));
        piano_roll_plot(score, state.duration_sec(), &path, size)?;
        written.push(("piano_roll", path));
    }

    if !state.onset_envelope.is_empty() {
        let path = qa_dir.join(format!("{}_onsets.png", basename));
        onset_plot(state, &path, size)?;
        written.push(("onsets", path));
    }

    tracing::info!("QA artifacts generated in {}", qa_dir.display());
    Ok(written)
}

/// Pitch against time, one colour per voice
fn piano_roll_plot(score: &Score, duration_sec: f32, path: &Path, size: (u32, u32)) -> SatbResult<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(qa_err("Failed to fill plot background"))?;

    let sec_per_quarter = 60.0 / score.tempo_bpm.max(1.0);
    let span = (score.total_quarters() * sec_per_quarter).max(duration_sec).max(1.0);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0f32..span, 34f32..86f32)
        .map_err(qa_err("Failed to build chart"))?;

    // Octave guides at every C
    chart
        .draw_series((36..=84).step_by(12).map(|c| {
            PathElement::new(vec![(0.0, c as f32), (span, c as f32)], RGBColor(220, 220, 220))
        }))
        .map_err(qa_err("Failed to draw guides"))?;

    for part in &score.parts {
        let color = voice_color(part.voice);
        let mut t = 0.0f32;
        let mut bars = Vec::new();
        for event in &part.events {
            let len = event.duration() * sec_per_quarter;
            if let Some(midi) = event.midi() {
                let y = midi as f32;
                bars.push(Rectangle::new([(t, y - 0.4), (t + len * 0.95, y + 0.4)], color.filled()));
            }
            t += len;
        }
        chart
            .draw_series(bars)
            .map_err(qa_err("Failed to draw notes"))?;
    }

    root.present().map_err(qa_err("Failed to write piano roll"))?;
    Ok(())
}

/// Normalized onset envelope with picked onsets marked
fn onset_plot(state: &AudioState, path: &Path, size: (u32, u32)) -> SatbResult<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(qa_err("Failed to fill plot background"))?;

    let hop = state.config.stft.hop_length;
    let max = state.onset_envelope.iter().copied().fold(0.0f32, f32::max).max(1e-9);
    let end = frames_to_time(state.onset_envelope.len(), hop, state.sr).max(0.1);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0f32..end, 0f32..1.05f32)
        .map_err(qa_err("Failed to build chart"))?;

    chart
        .draw_series(state.onsets.iter().map(|o| {
            PathElement::new(vec![(o.time_sec, 0.0), (o.time_sec, 1.05)], RED.mix(0.6))
        }))
        .map_err(qa_err("Failed to draw onsets"))?;

    chart
        .draw_series(LineSeries::new(
            state
                .onset_envelope
                .iter()
                .enumerate()
                .map(|(i, &v)| (frames_to_time(i, hop, state.sr), v / max)),
            &BLACK,
        ))
        .map_err(qa_err("Failed to draw envelope"))?;

    root.present().map_err(qa_err("Failed to write onset plot"))?;
    Ok(())
}

/// Colour used for a voice in QA plots
pub fn voice_color(voice: Voice) -> RGBColor {
    VOICE_COLORS[voice.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = AudioState::from_samples(vec![0.0; 1000], 22050, &crate::Config::default());
        let files = generate_artifacts(&state, dir.path(), "song", &QaConfig::default()).unwrap();
        assert!(files.is_empty());
        assert!(!dir.path().join("qa").exists());
    }

    #[test]
    fn test_voice_colors_distinct() {
        let colors: Vec<_> = Voice::ALL.iter().map(|&v| voice_color(v)).collect();
        for i in 0..4 {
            for j in i + 1..4 {
                assert_ne!(colors[i], colors[j]);
            }
        }
    }
}
