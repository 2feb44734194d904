//! Pass 3: Pitch Tracking

use crate::analysis::PitchPeak;
use crate::audio::AudioState;
use crate::config::{Config, PitchConfig};
use crate::error::{Result as SatbResult, SatbError};
use ndarray::{Array2, ArrayView1};

/// Find interpolated spectral peaks in one frame
///
/// A bin within `[fmin, fmax]` is a peak when it is strictly above its lower
/// neighbour, at least its upper neighbour, and above `peak_threshold` times the
/// frame maximum. Frequency and magnitude are refined with a parabola through
/// the bin and its neighbours.
pub fn frame_peaks(
    frame: &ArrayView1<f32>,
    freqs: &[f32],
    bin_hz: f32,
    pitch: &PitchConfig,
) -> Vec<PitchPeak> {
    let n_bins = frame.len().min(freqs.len());
    if n_bins < 3 {
        return Vec::new();
    }

    let frame_max = frame.iter().copied().fold(0.0f32, f32::max);
    if frame_max <= 0.0 {
        return Vec::new();
    }
    let threshold = pitch.peak_threshold * frame_max;

    let mut peaks = Vec::new();
    for bin in 1..n_bins - 1 {
        let freq = freqs[bin];
        if freq < pitch.fmin || freq > pitch.fmax {
            continue;
        }

        let prev = frame[bin - 1];
        let cur = frame[bin];
        let next = frame[bin + 1];
        if !(cur > prev && cur >= next && cur > threshold) {
            continue;
        }

        let avg = 0.5 * (next - prev);
        let curvature = 2.0 * cur - next - prev;
        let shift = if curvature.abs() > f32::EPSILON { avg / curvature } else { 0.0 };

        peaks.push(PitchPeak {
            freq_hz: (bin as f32 + shift) * bin_hz,
            magnitude: cur + 0.5 * avg * shift,
            bin,
        });
    }

    peaks
}

/// Track pitch peaks for every frame of a magnitude spectrogram
pub fn track_pitches(
    mag: &Array2<f32>,
    freqs: &[f32],
    sr: u32,
    n_fft: usize,
    pitch: &PitchConfig,
) -> Vec<Vec<PitchPeak>> {
    let bin_hz = sr as f32 / n_fft as f32;
    mag.columns()
        .into_iter()
        .map(|frame| frame_peaks(&frame, freqs, bin_hz, pitch))
        .collect()
}

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 3: Pitch Tracking");

    let harmonic = state.harmonic.as_ref().ok_or_else(|| {
        SatbError::ProcessingPipelineError("Pass 1 must be run before Pass 3".to_string())
    })?;

    state.pitch_frames = track_pitches(
        harmonic,
        &state.freqs,
        state.sr,
        config.stft.n_fft,
        &config.pitch,
    );

    let total: usize = state.pitch_frames.iter().map(Vec::len).sum();
    tracing::info!(
        "  ✓ Found {} spectral peaks across {} frames",
        total,
        state.pitch_frames.len()
    );
    Ok(())
}
