//! Pass 5: Score Assembly

use crate::analysis::{OnsetAssignment, Score, Voice, VoiceEvent};
use crate::audio::AudioState;
use crate::config::{Config, RhythmMode};
use crate::error::{Result as SatbResult, SatbError};
use crate::pitch::{detect_key, KeyDetection, SolfegeSystem};

/// Note lengths, in quarters, that inter-onset durations snap to
pub const ALLOWED_DURATIONS: [f32; 8] = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0];

/// Snap a length in quarters to the nearest allowed duration
pub fn snap_duration(quarters: f32) -> f32 {
    ALLOWED_DURATIONS
        .iter()
        .copied()
        .min_by(|a, b| (a - quarters).abs().total_cmp(&(b - quarters).abs()))
        .unwrap_or(1.0)
}

/// Duration of every onset's events in quarter notes
pub fn event_durations(onset_times: &[f32], mode: RhythmMode, tempo_bpm: f32) -> Vec<f32> {
    match mode {
        RhythmMode::Quarter => vec![1.0; onset_times.len()],
        RhythmMode::InterOnset => {
            let quarters_per_sec = tempo_bpm / 60.0;
            let mut durations: Vec<f32> = onset_times
                .windows(2)
                .map(|w| snap_duration((w[1] - w[0]) * quarters_per_sec))
                .collect();
            if !onset_times.is_empty() {
                durations.push(1.0);
            }
            durations
        }
    }
}

/// Build a four-part score from per-onset voice assignments
pub fn build_score(
    title: &str,
    assignments: &[OnsetAssignment],
    config: &Config,
    solfege: SolfegeSystem,
) -> Score {
    let mut score = Score::new(title, config.rhythm.tempo_bpm, config.rhythm.beats_per_measure);

    let pitches: Vec<u8> = assignments
        .iter()
        .flat_map(|a| a.pitches.iter().flatten().copied())
        .collect();
    score.key = detect_key(&pitches);

    let times: Vec<f32> = assignments.iter().map(|a| a.time_sec).collect();
    let durations = event_durations(&times, config.rhythm.mode, config.rhythm.tempo_bpm);

    for (assignment, &duration) in assignments.iter().zip(&durations) {
        for (voice, part) in Voice::ALL.iter().zip(score.parts.iter_mut()) {
            let event = match assignment.pitch(*voice) {
                Some(midi) => VoiceEvent::Note {
                    midi,
                    duration,
                    solfege: syllable(solfege, midi, &score.key),
                },
                None => VoiceEvent::Rest { duration },
            };
            part.events.push(event);
        }
    }

    score
}

fn syllable(system: SolfegeSystem, midi: u8, key: &KeyDetection) -> Option<String> {
    system.syllable(midi, key).map(str::to_string)
}

pub fn run(state: &mut AudioState, config: &Config) -> SatbResult<()> {
    tracing::info!("Pass 5: Score Assembly");

    let Some(assignments) = state.assignments.as_deref() else {
        return Err(SatbError::ProcessingPipelineError(
            "Pass 4 must be run before Pass 5".to_string(),
        ));
    };

    let solfege: SolfegeSystem = config
        .export
        .solfege
        .parse()
        .map_err(SatbError::ConfigValidationFailed)?;

    let score = build_score(&state.title, assignments, config, solfege);

    tracing::info!(
        "  ✓ Key {} {:?} (confidence {:.2}), {} events per part",
        score.key.root,
        score.key.mode,
        score.key.confidence,
        assignments.len()
    );

    state.key = Some(score.key.clone());
    state.score = Some(score);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::KeyMode;

    fn assignment(idx: usize, time: f32, pitches: [Option<u8>; 4]) -> OnsetAssignment {
        OnsetAssignment { onset_idx: idx, time_sec: time, frame_idx: idx * 10, pitches }
    }

    #[test]
    fn test_snap_duration() {
        assert_eq!(snap_duration(0.9), 1.0);
        assert_eq!(snap_duration(1.3), 1.5);
        assert_eq!(snap_duration(0.1), 0.25);
        assert_eq!(snap_duration(10.0), 4.0);
    }

    #[test]
    fn test_inter_onset_durations() {
        // 120 bpm: half a second per quarter
        let d = event_durations(&[0.0, 0.5, 0.75, 1.75], RhythmMode::InterOnset, 120.0);
        assert_eq!(d, vec![1.0, 0.5, 2.0, 1.0]);
        assert_eq!(event_durations(&[0.0, 3.0], RhythmMode::Quarter, 120.0), vec![1.0, 1.0]);
        assert!(event_durations(&[], RhythmMode::InterOnset, 120.0).is_empty());
    }

    #[test]
    fn test_build_score_notes_and_rests() {
        let assignments = vec![
            assignment(0, 0.0, [Some(72), Some(64), Some(55), Some(48)]),
            assignment(1, 0.5, [Some(67), None, None, Some(43)]),
        ];
        let score = build_score("demo", &assignments, &Config::default(), SolfegeSystem::Fixed);
        assert_eq!(score.title, "demo");
        for part in &score.parts {
            assert_eq!(part.events.len(), 2);
        }
        let alto = score.part(Voice::Alto).unwrap();
        assert_eq!(alto.events[1], VoiceEvent::Rest { duration: 1.0 });
        let soprano = score.part(Voice::Soprano).unwrap();
        assert_eq!(
            soprano.events[1],
            VoiceEvent::Note { midi: 67, duration: 1.0, solfege: Some("sol".to_string()) }
        );
        assert_eq!(score.key.root, "C");
        assert_eq!(score.key.mode, KeyMode::Major);
    }

    #[test]
    fn test_build_score_without_solfege() {
        let assignments = vec![assignment(0, 0.0, [Some(72), None, None, None])];
        let score = build_score("x", &assignments, &Config::default(), SolfegeSystem::None);
        assert_eq!(
            score.part(Voice::Soprano).unwrap().events[0],
            VoiceEvent::Note { midi: 72, duration: 1.0, solfege: None }
        );
    }
}
