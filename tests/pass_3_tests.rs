//! Validation tests for Pass 3: Pitch Tracking

mod common;

use common::{chords, sine, SR};
use satb::audio::AudioState;
use satb::config::Config;
use satb::passes::{pass_0, pass_1, pass_3};
use satb::pitch::midi_to_hz;
use satb::SatbError;

fn tracked(samples: Vec<f32>, config: &Config) -> AudioState {
    let mut state = AudioState::from_samples(samples, SR, config);
    pass_0::run(&mut state, config).unwrap();
    pass_1::run(&mut state, config).unwrap();
    pass_3::run(&mut state, config).unwrap();
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_harmonic_spectrogram() {
        let config = Config::default();
        let mut state = AudioState::from_samples(sine(440.0, 0.5, 1.0, SR), SR, &config);
        pass_0::run(&mut state, &config).unwrap();
        assert!(matches!(
            pass_3::run(&mut state, &config),
            Err(SatbError::ProcessingPipelineError(_))
        ));
    }

    #[test]
    fn test_one_peak_list_per_frame() {
        let config = Config::default();
        let state = tracked(sine(440.0, 0.5, 1.0, SR), &config);
        assert_eq!(state.pitch_frames.len(), state.harmonic.as_ref().unwrap().dim().1);
    }

    #[test]
    fn test_sine_frequency_is_refined() {
        let config = Config::default();
        let state = tracked(sine(440.0, 0.5, 1.0, SR), &config);

        let mid = state.pitch_frames.len() / 2;
        let strongest = state.pitch_frames[mid]
            .iter()
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
            .unwrap();
        // Bin spacing is ~10.8 Hz; interpolation lands well inside one bin
        assert!((strongest.freq_hz - 440.0).abs() < 3.0, "{} Hz", strongest.freq_hz);
        assert!(strongest.magnitude > 0.5);
    }

    #[test]
    fn test_every_chord_tone_found() {
        let config = Config::default();
        let pitches: [u8; 3] = [57, 64, 72];
        let state = tracked(chords(&[(&pitches[..], 0.0, 1.5)], 1.5, SR), &config);

        let mid = state.pitch_frames.len() / 2;
        let peaks = &state.pitch_frames[mid];
        for &m in &pitches {
            let hz = midi_to_hz(m as f32);
            assert!(
                peaks.iter().any(|p| (p.freq_hz - hz).abs() < 3.0),
                "no peak near {} Hz in {:?}",
                hz,
                peaks
            );
        }
    }

    #[test]
    fn test_peaks_respect_band() {
        let mut config = Config::default();
        config.pitch.fmin = 300.0;
        config.pitch.fmax = 1000.0;
        let pitches: [u8; 2] = [45, 69]; // 110 Hz is out of band
        let state = tracked(chords(&[(&pitches[..], 0.0, 1.0)], 1.0, SR), &config);

        for frame in &state.pitch_frames {
            for p in frame {
                let bin_hz = SR as f32 / config.stft.n_fft as f32;
                let centre = p.bin as f32 * bin_hz;
                assert!(centre >= 300.0 && centre <= 1000.0, "peak at {} Hz", centre);
            }
        }
    }

    #[test]
    fn test_silence_has_no_peaks() {
        let config = Config::default();
        let state = tracked(vec![0.0; SR as usize], &config);
        assert!(state.pitch_frames.iter().all(Vec::is_empty));
    }
}
