//! Pass 0: Preflight & Normalization

use crate::audio::{normalize_peak, peak, rms, validate_samples, AudioState};
use crate::config::Config;
use crate::error::Result as SatbResult;

/// Signal level below which the recording is treated as silent
const SILENCE_RMS: f32 = 1e-6;

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 0: Preflight & Normalization");

    validate_samples(&state.y, state.sr, config)?;

    let input_peak = peak(&state.y);
    if input_peak > 0.99 {
        tracing::warn!("Audio may be clipped (peak = {:.3})", input_peak);
    }

    let level = rms(&state.y);
    let processed = if level < SILENCE_RMS {
        tracing::warn!("Audio appears to be silent (RMS = {:.2e}); the score will be empty", level);
        state.y.clone()
    } else if config.audio.normalize {
        tracing::debug!("Normalizing peak {:.3} -> 1.0", input_peak);
        normalize_peak(&state.y, 1.0)
    } else {
        state.y.clone()
    };

    state.y_processed = Some(processed);

    tracing::info!(
        "  ✓ Pass 0 complete ({:.2}s at {} Hz)",
        state.duration_sec(),
        state.sr
    );
    Ok(())
}
