//! Validation tests for Pass 5: Score Assembly

mod common;

use common::{progression, PROGRESSION, SR};
use satb::analysis::{OnsetAssignment, Voice, VoiceEvent};
use satb::audio::AudioState;
use satb::config::{Config, RhythmMode};
use satb::passes::pass_5::{self, build_score};
use satb::passes::{pass_0, pass_1, pass_2, pass_3};
use satb::pitch::{KeyMode, SolfegeSystem};
use satb::{SatbError, SatbGenerator};

fn progression_assignments(times: &[f32]) -> Vec<OnsetAssignment> {
    PROGRESSION
        .iter()
        .zip(times)
        .enumerate()
        .map(|(i, (chord, &time_sec))| OnsetAssignment {
            onset_idx: i,
            time_sec,
            frame_idx: i * 20,
            pitches: chord.map(Some),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_earlier_passes() {
        let config = Config::default();
        let mut state = AudioState::from_samples(vec![0.0; 1024], SR, &config);
        assert!(matches!(
            pass_5::run(&mut state, &config),
            Err(SatbError::ProcessingPipelineError(_))
        ));
    }

    #[test]
    fn test_requires_voice_assignment() {
        // Passes 0-3 leave onsets and pitch frames but no voicing
        let config = Config::default();
        let mut state = AudioState::from_samples(progression(SR), SR, &config);
        pass_0::run(&mut state, &config).unwrap();
        pass_1::run(&mut state, &config).unwrap();
        pass_2::run(&mut state, &config).unwrap();
        pass_3::run(&mut state, &config).unwrap();
        assert_eq!(state.onsets.len(), 4);

        let err = pass_5::run(&mut state, &config).unwrap_err();
        assert!(err.to_string().starts_with("E007"));
        assert!(state.score.is_none());
    }

    #[test]
    fn test_empty_voicing_gives_empty_score() {
        let config = Config::default();
        let mut state = AudioState::from_samples(vec![0.0; 1024], SR, &config);
        state.assignments = Some(Vec::new());
        pass_5::run(&mut state, &config).unwrap();
        let score = state.score.unwrap();
        assert!(score.parts.iter().all(|p| p.events.is_empty()));
    }

    #[test]
    fn test_rejects_unknown_solfege() {
        let mut config = Config::default();
        config.export.solfege = "tonic-sol-fa".to_string();
        let mut state = AudioState::from_samples(vec![0.0; 1024], SR, &config);
        state.assignments = Some(Vec::new());
        assert!(matches!(
            pass_5::run(&mut state, &config),
            Err(SatbError::ConfigValidationFailed(_))
        ));
    }

    #[test]
    fn test_run_stores_key_and_score() {
        let mut config = Config::default();
        config.export.solfege = "movable".to_string();
        let mut state = AudioState::from_samples(vec![0.0; 1024], SR, &config);
        state.title = "Hymn".to_string();
        state.assignments = Some(progression_assignments(&[0.0, 0.5, 1.0, 1.5]));
        pass_5::run(&mut state, &config).unwrap();

        let score = state.score.as_ref().unwrap();
        assert_eq!(score.title, "Hymn");
        assert_eq!(state.key.as_ref(), Some(&score.key));
        assert_eq!(score.key.root, "G");
        assert_eq!(score.key.mode, KeyMode::Major);

        // G is do in G major
        let bass = score.part(Voice::Bass).unwrap();
        assert_eq!(
            bass.events[0],
            VoiceEvent::Note { midi: 55, duration: 1.0, solfege: Some("do".to_string()) }
        );
        // F# is ti
        let soprano = score.part(Voice::Soprano).unwrap();
        assert_eq!(soprano.events[2].midi(), Some(78));
        assert_eq!(
            soprano.events[2],
            VoiceEvent::Note { midi: 78, duration: 1.0, solfege: Some("ti".to_string()) }
        );
    }

    #[test]
    fn test_every_part_has_one_event_per_onset() {
        let config = Config::default();
        let mut assignments = progression_assignments(&[0.0, 0.5, 1.0, 1.5]);
        assignments[1].pitches = [Some(76), None, None, Some(48)];
        let score = build_score("t", &assignments, &config, SolfegeSystem::None);

        assert_eq!(score.parts.len(), 4);
        for part in &score.parts {
            assert_eq!(part.events.len(), assignments.len());
            assert_eq!(part.total_quarters(), 4.0);
        }
        assert_eq!(score.part(Voice::Alto).unwrap().rest_count(), 1);
        assert_eq!(score.part(Voice::Tenor).unwrap().events[1], VoiceEvent::Rest { duration: 1.0 });
        assert_eq!(score.part(Voice::Bass).unwrap().rest_count(), 0);
    }

    #[test]
    fn test_inter_onset_rhythm() {
        let mut config = Config::default();
        config.rhythm.mode = RhythmMode::InterOnset;
        config.rhythm.tempo_bpm = 60.0;
        // 1s, 0.5s, 2s at one quarter per second, then the closing quarter
        let assignments = progression_assignments(&[0.0, 1.0, 1.5, 3.5]);
        let score = build_score("t", &assignments, &config, SolfegeSystem::Fixed);

        let durations: Vec<f32> = score.parts[0].events.iter().map(VoiceEvent::duration).collect();
        assert_eq!(durations, vec![1.0, 0.5, 2.0, 1.0]);
        for part in &score.parts {
            assert_eq!(part.total_quarters(), 4.5);
        }
    }

    #[test]
    fn test_fixed_solfege_ignores_key() {
        let config = Config::default();
        let assignments = progression_assignments(&[0.0, 0.5, 1.0, 1.5]);
        let score = build_score("t", &assignments, &config, SolfegeSystem::Fixed);
        let bass = score.part(Voice::Bass).unwrap();
        let syllables: Vec<Option<String>> = bass
            .events
            .iter()
            .map(|e| match e {
                VoiceEvent::Note { solfege, .. } => solfege.clone(),
                VoiceEvent::Rest { .. } => None,
            })
            .collect();
        // G, C, D, G
        assert_eq!(
            syllables,
            vec![Some("sol".into()), Some("do".into()), Some("re".into()), Some("sol".into())]
        );
    }

    #[test]
    fn test_no_assignments_gives_empty_parts() {
        let config = Config::default();
        let score = build_score("quiet", &[], &config, SolfegeSystem::Movable);
        assert_eq!(score.parts.len(), 4);
        assert!(score.parts.iter().all(|p| p.events.is_empty()));
        assert_eq!(score.key.confidence, 0.0);
    }

    #[test]
    fn test_transcribe_progression() {
        let mut config = Config::default();
        config.export.solfege = "fixed".to_string();
        let score = SatbGenerator::new(config).transcribe_samples(progression(SR), SR).unwrap();

        for (voice, part) in Voice::ALL.iter().zip(&score.parts) {
            assert_eq!(part.voice, *voice);
            let sung: Vec<Option<u8>> = part.events.iter().map(VoiceEvent::midi).collect();
            let expected: Vec<Option<u8>> = PROGRESSION.iter().map(|c| Some(c[voice.index()])).collect();
            assert_eq!(sung, expected);
        }
        assert_eq!(score.key.root, "G");
        assert_eq!(score.tempo_bpm, 120.0);
    }

    #[test]
    fn test_transcribe_silence() {
        let score = SatbGenerator::new(Config::default())
            .transcribe_samples(vec![0.0; SR as usize], SR)
            .unwrap();
        assert!(score.parts.iter().all(|p| p.events.is_empty()));
    }
}
