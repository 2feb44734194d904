//! Pass 2: Onset Detection

use crate::audio::{AudioState, OnsetEvent};
use crate::config::{Config, OnsetConfig};
use crate::error::{Result as SatbResult, SatbError};
use crate::spectral::{frames_to_time, onset_strength};

/// Peak-picking windows converted from seconds to frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakPickParams {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
}

impl PeakPickParams {
    pub fn from_config(onset: &OnsetConfig, sr: u32, hop: usize) -> Self {
        let frames = |sec: f32| (sec * sr as f32 / hop as f32).floor() as usize;
        Self {
            pre_max: frames(onset.pre_max_sec),
            post_max: frames(onset.post_max_sec) + 1,
            pre_avg: frames(onset.pre_avg_sec),
            post_avg: frames(onset.post_avg_sec) + 1,
            wait: frames(onset.wait_sec),
        }
    }
}

/// Scale an envelope to [0, 1]; a flat envelope becomes all zeros
pub fn normalize_envelope(envelope: &[f32]) -> Vec<f32> {
    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; envelope.len()];
    }
    envelope.iter().map(|&x| (x - min) / range).collect()
}

/// Delay an envelope by `frames`, keeping its length
///
/// Flux rises as soon as a note enters the edge of the analysis window; the
/// delay moves each peak to the frame centred on the attack.
pub fn align_to_frame_centers(envelope: &[f32], frames: usize) -> Vec<f32> {
    let len = envelope.len();
    let shift = frames.min(len);
    let mut aligned = vec![0.0; shift];
    aligned.extend_from_slice(&envelope[..len - shift]);
    aligned
}

/// Pick onset frames from a normalized envelope
///
/// Frame `n` is an onset when it is the maximum of `[n - pre_max, n + post_max)`,
/// exceeds the mean of `[n - pre_avg, n + post_avg)` by `delta`, and lies more
/// than `wait` frames after the previous onset.
pub fn peak_pick(envelope: &[f32], params: &PeakPickParams, delta: f32) -> Vec<usize> {
    let mut peaks = Vec::new();
    let len = envelope.len();
    let mut last_peak: Option<usize> = None;

    for n in 0..len {
        if let Some(last) = last_peak {
            if n <= last + params.wait {
                continue;
            }
        }

        let x = envelope[n];
        if x <= 0.0 {
            continue;
        }

        let max_start = n.saturating_sub(params.pre_max);
        let max_end = (n + params.post_max).min(len);
        let local_max = envelope[max_start..max_end]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if x < local_max {
            continue;
        }

        let avg_start = n.saturating_sub(params.pre_avg);
        let avg_end = (n + params.post_avg).min(len);
        let window = &envelope[avg_start..avg_end];
        let local_mean = window.iter().sum::<f32>() / window.len() as f32;
        if x < local_mean + delta {
            continue;
        }

        peaks.push(n);
        last_peak = Some(n);
    }

    peaks
}

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 2: Onset Detection");

    let magnitude = state.magnitude.as_ref().ok_or_else(|| {
        SatbError::ProcessingPipelineError("Pass 1 must be run before Pass 2".to_string())
    })?;

    tracing::debug!("  Computing onset strength envelope...");
    let flux = onset_strength(magnitude, config.onset.db_range);
    let centre_shift = config.stft.n_fft / (2 * config.stft.hop_length);
    let envelope = normalize_envelope(&align_to_frame_centers(&flux, centre_shift));

    let params = PeakPickParams::from_config(&config.onset, state.sr, config.stft.hop_length);
    tracing::debug!("  Picking peaks with {:?}", params);
    let peak_frames = peak_pick(&envelope, &params, config.onset.delta);

    state.onsets = peak_frames
        .iter()
        .map(|&frame_idx| OnsetEvent {
            time_sec: frames_to_time(frame_idx, config.stft.hop_length, state.sr),
            frame_idx,
            strength: envelope[frame_idx],
        })
        .collect();
    state.onset_envelope = envelope;

    tracing::info!("  ✓ Detected {} onset events", state.onsets.len());
    Ok(())
}
