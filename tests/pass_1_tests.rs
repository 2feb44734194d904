//! Validation tests for Pass 1: Spectral Analysis & Harmonic Separation

mod common;

use common::{sine, SR};
use satb::audio::AudioState;
use satb::config::Config;
use satb::passes::{pass_0, pass_1};
use satb::SatbError;

fn analysed(samples: Vec<f32>, config: &Config) -> AudioState {
    let mut state = AudioState::from_samples(samples, SR, config);
    pass_0::run(&mut state, config).unwrap();
    pass_1::run(&mut state, config).unwrap();
    state
}

fn bin_of(freq: f32, config: &Config) -> usize {
    (freq * config.stft.n_fft as f32 / SR as f32).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_preflight() {
        let config = Config::default();
        let mut state = AudioState::from_samples(sine(440.0, 0.5, 1.0, SR), SR, &config);
        assert!(matches!(
            pass_1::run(&mut state, &config),
            Err(SatbError::ProcessingPipelineError(_))
        ));
    }

    #[test]
    fn test_frame_and_bin_counts() {
        let config = Config::default();
        let n = SR as usize;
        let state = analysed(sine(440.0, 0.5, 1.0, SR), &config);

        let mag = state.magnitude.as_ref().unwrap();
        let expected_frames = n / config.stft.hop_length + 1;
        assert_eq!(mag.dim(), (config.stft.n_fft / 2 + 1, expected_frames));
        assert_eq!(state.freqs.len(), config.stft.n_fft / 2 + 1);
        assert_eq!(state.stft.as_ref().unwrap().times.len(), expected_frames);
    }

    #[test]
    fn test_sine_amplitude_is_preserved() {
        let mut config = Config::default();
        config.audio.normalize = false;
        let state = analysed(sine(440.0, 0.5, 1.0, SR), &config);

        let mag = state.magnitude.as_ref().unwrap();
        let mid = mag.dim().1 / 2;
        let bin = bin_of(440.0, &config);
        let level = mag[[bin, mid]];
        assert!(level > 0.4 && level < 0.55, "peak magnitude {}", level);

        // Strongest bin of the middle frame is the tone
        let column = mag.column(mid);
        let argmax = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(argmax, bin);
    }

    #[test]
    fn test_harmonic_keeps_sustained_tone() {
        let config = Config::default();
        let state = analysed(sine(330.0, 0.5, 1.5, SR), &config);

        let mag = state.magnitude.as_ref().unwrap();
        let harmonic = state.harmonic.as_ref().unwrap();
        assert_eq!(mag.dim(), harmonic.dim());

        for (h, m) in harmonic.iter().zip(mag.iter()) {
            assert!(*h <= *m + 1e-6);
        }

        let mid = mag.dim().1 / 2;
        let bin = bin_of(330.0, &config);
        assert!(harmonic[[bin, mid]] > 0.9 * mag[[bin, mid]]);
    }

    #[test]
    fn test_separation_disabled_copies_magnitude() {
        let mut config = Config::default();
        config.hpss.enabled = false;
        let state = analysed(sine(262.0, 0.5, 0.5, SR), &config);
        assert_eq!(state.harmonic, state.magnitude);
    }
}
