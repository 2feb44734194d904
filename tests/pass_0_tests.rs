//! Validation tests for Pass 0: Preflight & Normalization

mod common;

use common::{sine, SR};
use rand::{rngs::StdRng, Rng, SeedableRng};
use satb::audio::{peak, AudioState};
use satb::config::Config;
use satb::passes::pass_0;
use satb::SatbError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_normalized_to_unity() {
        let config = Config::default();
        let mut state = AudioState::from_samples(sine(440.0, 0.25, 1.0, SR), SR, &config);
        pass_0::run(&mut state, &config).unwrap();

        let processed = state.y_processed.as_ref().unwrap();
        assert_eq!(processed.len(), state.y.len());
        assert!((peak(processed) - 1.0).abs() < 1e-5);
        // Raw samples are kept
        assert!((peak(&state.y) - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_noise_is_normalized() {
        let config = Config::default();
        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<f32> = (0..SR).map(|_| rng.gen_range(-0.05..0.05)).collect();
        let mut state = AudioState::from_samples(noise, SR, &config);
        pass_0::run(&mut state, &config).unwrap();

        let processed = state.y_processed.as_ref().unwrap();
        assert!((peak(processed) - 1.0).abs() < 1e-5);
        // Scaling keeps the sign of every sample
        assert!(processed.iter().zip(&state.y).all(|(p, y)| p * y >= 0.0));
    }

    #[test]
    fn test_normalization_can_be_disabled() {
        let mut config = Config::default();
        config.audio.normalize = false;
        let samples = sine(220.0, 0.3, 0.5, SR);
        let mut state = AudioState::from_samples(samples.clone(), SR, &config);
        pass_0::run(&mut state, &config).unwrap();
        assert_eq!(state.y_processed.unwrap(), samples);
    }

    #[test]
    fn test_silence_passes_through() {
        let config = Config::default();
        let mut state = AudioState::from_samples(vec![0.0; SR as usize], SR, &config);
        pass_0::run(&mut state, &config).unwrap();
        assert!(state.y_processed.unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_rejects_short_audio() {
        let config = Config::default();
        let mut state = AudioState::from_samples(sine(440.0, 0.5, 0.1, SR), SR, &config);
        let err = pass_0::run(&mut state, &config).unwrap_err();
        assert!(matches!(err, SatbError::InputValidationError(_)));
        assert!(state.y_processed.is_none());
    }

    #[test]
    fn test_rejects_unsupported_sample_rate() {
        let config = Config::default();
        let mut state = AudioState::from_samples(vec![0.1; 4000], 4000, &config);
        assert!(matches!(
            pass_0::run(&mut state, &config),
            Err(SatbError::UnsupportedSampleRate(4000))
        ));
    }

    #[test]
    fn test_duration_reporting() {
        let config = Config::default();
        let state = AudioState::from_samples(vec![0.0; 2 * SR as usize], SR, &config);
        assert!((state.duration_sec() - 2.0).abs() < 1e-6);
    }
}
