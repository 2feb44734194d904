//! Pass 4: Voice Assignment

use crate::analysis::{OnsetAssignment, PitchCandidate, PitchPeak, Voice};
use crate::audio::AudioState;
use crate::config::{Config, PitchConfig, VoiceRangesConfig};
use crate::error::{Result as SatbResult, SatbError};
use crate::pitch::hz_to_midi;

/// Turn the peaks of one frame into MIDI candidates, strongest first
///
/// Peaks at or below `min_magnitude` or outside `satb_low..=satb_high` are
/// dropped. With `dedupe` only the strongest peak per MIDI pitch survives.
/// The result is truncated to `max_voices`.
pub fn candidates_for_frame(peaks: &[PitchPeak], pitch: &PitchConfig) -> Vec<PitchCandidate> {
    let mut candidates: Vec<PitchCandidate> = peaks
        .iter()
        .filter(|p| p.magnitude > pitch.min_magnitude && p.freq_hz > 0.0)
        .filter_map(|p| {
            let midi = hz_to_midi(p.freq_hz).round();
            if midi < pitch.satb_low as f32 || midi > pitch.satb_high as f32 {
                return None;
            }
            Some(PitchCandidate { midi: midi as u8, magnitude: p.magnitude })
        })
        .collect();

    // Stable: equal magnitudes keep spectral (low to high) order
    candidates.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));

    if pitch.dedupe {
        let mut seen = [false; 128];
        candidates.retain(|c| !std::mem::replace(&mut seen[c.midi as usize], true));
    }

    candidates.truncate(pitch.max_voices);
    candidates
}

/// Greedily place pitches into the four voices
///
/// Pitches are visited from highest to lowest. Each goes to the first voice in
/// Soprano, Alto, Tenor, Bass order that is still free and whose range contains
/// it; a pitch that fits nowhere is dropped.
pub fn assign_voices(candidates: &[PitchCandidate], ranges: &VoiceRangesConfig) -> [Option<u8>; 4] {
    let mut pitches: Vec<u8> = candidates.iter().map(|c| c.midi).collect();
    pitches.sort_unstable_by(|a, b| b.cmp(a));

    let mut slots = [None; 4];
    for midi in pitches {
        let target = Voice::ALL
            .iter()
            .find(|v| slots[v.index()].is_none() && v.range(ranges).contains(midi));
        match target {
            Some(voice) => slots[voice.index()] = Some(midi),
            None => tracing::trace!("  pitch {} fits no free voice", midi),
        }
    }

    slots
}

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 4: Voice Assignment");

    if state.onset_envelope.is_empty() {
        return Err(SatbError::ProcessingPipelineError(
            "Pass 2 must be run before Pass 4".to_string(),
        ));
    }
    if state.pitch_frames.is_empty() {
        return Err(SatbError::ProcessingPipelineError(
            "Pass 3 must be run before Pass 4".to_string(),
        ));
    }

    let n_frames = state.pitch_frames.len();
    let mut assignments = Vec::with_capacity(state.onsets.len());
    let mut skipped = 0;

    for (onset_idx, onset) in state.onsets.iter().enumerate() {
        let Some(peaks) = state.pitch_frames.get(onset.frame_idx) else {
            skipped += 1;
            continue;
        };

        let candidates = candidates_for_frame(peaks, &config.pitch);
        let pitches = assign_voices(&candidates, &config.voices);

        tracing::debug!(
            "  onset {} @ {:.3}s: {:?}",
            onset_idx,
            onset.time_sec,
            pitches
        );

        assignments.push(OnsetAssignment {
            onset_idx,
            time_sec: onset.time_sec,
            frame_idx: onset.frame_idx,
            pitches,
        });
    }

    if skipped > 0 {
        tracing::warn!(
            "  {} onsets lie beyond the {} analysed frames and were skipped",
            skipped,
            n_frames
        );
    }

    let notes: usize = assignments
        .iter()
        .map(|a| a.pitches.iter().flatten().count())
        .sum();
    tracing::info!(
        "  ✓ Assigned {} notes over {} onsets",
        notes,
        assignments.len()
    );

    state.assignments = Some(assignments);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(midi: u8, magnitude: f32) -> PitchCandidate {
        PitchCandidate { midi, magnitude }
    }

    #[test]
    fn test_assign_closed_chord() {
        // C major: C3 G3 E4 C5
        let slots = assign_voices(
            &[cand(48, 0.5), cand(55, 0.4), cand(64, 0.3), cand(72, 0.2)],
            &VoiceRangesConfig::default(),
        );
        assert_eq!(slots, [Some(72), Some(64), Some(55), Some(48)]);
    }

    #[test]
    fn test_assign_fills_upper_voices_first() {
        // Two pitches both inside soprano and alto ranges
        let slots = assign_voices(&[cand(62, 1.0), cand(67, 0.9)], &VoiceRangesConfig::default());
        assert_eq!(slots, [Some(67), Some(62), None, None]);
    }

    #[test]
    fn test_unplaceable_pitch_is_dropped() {
        // 83 fits only soprano; the second 82 has nowhere to go once soprano is taken
        let slots = assign_voices(&[cand(83, 1.0), cand(82, 0.5)], &VoiceRangesConfig::default());
        assert_eq!(slots, [Some(83), None, None, None]);
    }

    #[test]
    fn test_candidates_filter_and_rank() {
        let pitch = PitchConfig::default();
        let peaks = vec![
            PitchPeak { freq_hz: 30.0, magnitude: 0.9, bin: 1 },  // below span
            PitchPeak { freq_hz: 220.0, magnitude: 0.3, bin: 10 }, // A3
            PitchPeak { freq_hz: 221.0, magnitude: 0.5, bin: 11 }, // also A3
            PitchPeak { freq_hz: 440.0, magnitude: 0.005, bin: 20 }, // too weak
            PitchPeak { freq_hz: 659.3, magnitude: 0.4, bin: 30 }, // E5
        ];
        let c = candidates_for_frame(&peaks, &pitch);
        assert_eq!(c, vec![cand(57, 0.5), cand(76, 0.4)]);

        let no_dedupe = PitchConfig { dedupe: false, ..PitchConfig::default() };
        let c = candidates_for_frame(&peaks, &no_dedupe);
        assert_eq!(c.iter().map(|c| c.midi).collect::<Vec<_>>(), vec![57, 76, 57]);
    }

    #[test]
    fn test_candidates_truncate_to_max_voices() {
        let peaks: Vec<PitchPeak> = (0..6)
            .map(|i| PitchPeak {
                freq_hz: crate::pitch::midi_to_hz(48.0 + 4.0 * i as f32),
                magnitude: 0.1 * (i + 1) as f32,
                bin: i,
            })
            .collect();
        let c = candidates_for_frame(&peaks, &PitchConfig::default());
        assert_eq!(c.len(), 4);
        assert_eq!(c[0].midi, 68);
    }
}
