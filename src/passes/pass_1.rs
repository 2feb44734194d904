//! Pass 1: Spectral Analysis & Harmonic Separation

use crate::audio::AudioState;
use crate::config::Config;
use crate::error::{Result as SatbResult, SatbError};
use crate::spectral::{harmonic_percussive, magnitude_spectrogram, stft};

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 1: Spectral Analysis & Harmonic Separation");

    let samples = state.y_processed.as_ref().ok_or_else(|| {
        SatbError::ProcessingPipelineError("Pass 0 must be run before Pass 1".to_string())
    })?;

    if samples.is_empty() {
        return Err(SatbError::StftProcessingError("no samples to analyze".to_string()));
    }

    tracing::debug!(
        "  Computing STFT (n_fft={}, hop={})",
        config.stft.n_fft,
        config.stft.hop_length
    );
    let stft_data = stft(
        samples,
        config.stft.n_fft,
        config.stft.hop_length,
        &config.stft.window,
        state.sr,
    );
    let magnitude = magnitude_spectrogram(&stft_data);

    let harmonic = if config.hpss.enabled {
        tracing::debug!("  Separating harmonic component");
        let (harmonic, _percussive) = harmonic_percussive(
            &magnitude,
            config.hpss.kernel_harmonic,
            config.hpss.kernel_percussive,
            config.hpss.power,
        );
        harmonic
    } else {
        magnitude.clone()
    };

    let n_frames = stft_data.n_frames();
    state.freqs = stft_data.freqs.clone();
    state.stft = Some(stft_data);
    state.magnitude = Some(magnitude);
    state.harmonic = Some(harmonic);

    tracing::info!("  ✓ Pass 1 complete ({} frames)", n_frames);
    Ok(())
}
