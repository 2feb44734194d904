//! Score model and analysis export

use crate::audio::AudioState;
use crate::config::{RangeConfig, VoiceRangesConfig};
use crate::pitch::{midi_to_name, KeyDetection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One of the four choral voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Soprano,
    Alto,
    Tenor,
    Bass,
}

/// Staff clef used when engraving a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clef {
    Treble,
    /// Treble clef sounding an octave lower
    TrebleOctaveDown,
    Bass,
}

impl Voice {
    /// Voices in assignment order, highest first
    pub const ALL: [Voice; 4] = [Voice::Soprano, Voice::Alto, Voice::Tenor, Voice::Bass];

    /// Lowercase identifier used in file names and map keys
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Soprano => "soprano",
            Voice::Alto => "alto",
            Voice::Tenor => "tenor",
            Voice::Bass => "bass",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Voice::Soprano => "Soprano",
            Voice::Alto => "Alto",
            Voice::Tenor => "Tenor",
            Voice::Bass => "Bass",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Voice::Soprano => 0,
            Voice::Alto => 1,
            Voice::Tenor => 2,
            Voice::Bass => 3,
        }
    }

    /// Default range in MIDI note numbers
    pub fn default_range(&self) -> VocalRange {
        self.range(&VoiceRangesConfig::default())
    }

    /// Range for this voice from configuration
    pub fn range(&self, ranges: &VoiceRangesConfig) -> VocalRange {
        let r: RangeConfig = match self {
            Voice::Soprano => ranges.soprano,
            Voice::Alto => ranges.alto,
            Voice::Tenor => ranges.tenor,
            Voice::Bass => ranges.bass,
        };
        VocalRange { low: r.low, high: r.high }
    }

    /// General MIDI program (0-based): Choir Aahs for the upper voices, Voice Oohs below
    pub fn midi_program(&self) -> u8 {
        match self {
            Voice::Soprano | Voice::Alto => 52,
            Voice::Tenor | Voice::Bass => 53,
        }
    }

    pub fn clef(&self) -> Clef {
        match self {
            Voice::Soprano | Voice::Alto => Clef::Treble,
            Voice::Tenor => Clef::TrebleOctaveDown,
            Voice::Bass => Clef::Bass,
        }
    }
}

impl std::str::FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soprano" | "s" => Ok(Voice::Soprano),
            "alto" | "a" => Ok(Voice::Alto),
            "tenor" | "t" => Ok(Voice::Tenor),
            "bass" | "b" => Ok(Voice::Bass),
            other => Err(format!("unknown voice: {}", other)),
        }
    }
}

/// Inclusive MIDI pitch range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocalRange {
    pub low: u8,
    pub high: u8,
}

impl VocalRange {
    pub fn contains(&self, midi: u8) -> bool {
        self.low <= midi && midi <= self.high
    }
}

/// Spectral peak at a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchPeak {
    pub freq_hz: f32,
    pub magnitude: f32,
    pub bin: usize,
}

/// Pitch candidate at an onset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchCandidate {
    pub midi: u8,
    pub magnitude: f32,
}

/// Voice assignment result for one onset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetAssignment {
    pub onset_idx: usize,
    pub time_sec: f32,
    pub frame_idx: usize,
    /// Indexed by `Voice::index()`; None is a rest
    pub pitches: [Option<u8>; 4],
}

impl OnsetAssignment {
    pub fn pitch(&self, voice: Voice) -> Option<u8> {
        self.pitches[voice.index()]
    }
}

/// A note or a rest within one part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VoiceEvent {
    Note {
        midi: u8,
        /// Length in quarter notes
        duration: f32,
        solfege: Option<String>,
    },
    Rest {
        duration: f32,
    },
}

impl VoiceEvent {
    pub fn duration(&self) -> f32 {
        match self {
            VoiceEvent::Note { duration, .. } | VoiceEvent::Rest { duration } => *duration,
        }
    }

    pub fn midi(&self) -> Option<u8> {
        match self {
            VoiceEvent::Note { midi, .. } => Some(*midi),
            VoiceEvent::Rest { .. } => None,
        }
    }
}

/// The events sung by one voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub voice: Voice,
    pub events: Vec<VoiceEvent>,
}

impl Part {
    pub fn new(voice: Voice) -> Self {
        Self { voice, events: Vec::new() }
    }

    pub fn note_count(&self) -> usize {
        self.events.iter().filter(|e| e.midi().is_some()).count()
    }

    pub fn rest_count(&self) -> usize {
        self.events.len() - self.note_count()
    }

    pub fn total_quarters(&self) -> f32 {
        self.events.iter().map(VoiceEvent::duration).sum()
    }

    /// Lowest and highest sung pitch
    pub fn pitch_span(&self) -> Option<(u8, u8)> {
        let mut notes = self.events.iter().filter_map(VoiceEvent::midi);
        let first = notes.next()?;
        Some(notes.fold((first, first), |(lo, hi), m| (lo.min(m), hi.max(m))))
    }
}

/// Four-part transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub title: String,
    pub tempo_bpm: f32,
    pub beats_per_measure: u8,
    pub key: KeyDetection,
    pub parts: Vec<Part>,
}

impl Score {
    /// Empty score with one part per voice
    pub fn new(title: impl Into<String>, tempo_bpm: f32, beats_per_measure: u8) -> Self {
        Self {
            title: title.into(),
            tempo_bpm,
            beats_per_measure,
            key: KeyDetection::default(),
            parts: Voice::ALL.iter().map(|&v| Part::new(v)).collect(),
        }
    }

    pub fn part(&self, voice: Voice) -> Option<&Part> {
        self.parts.iter().find(|p| p.voice == voice)
    }

    /// Copy of the score restricted to the given voices, in SATB order
    pub fn select(&self, voices: &[Voice]) -> Score {
        Score {
            title: self.title.clone(),
            tempo_bpm: self.tempo_bpm,
            beats_per_measure: self.beats_per_measure,
            key: self.key.clone(),
            parts: self
                .parts
                .iter()
                .filter(|p| voices.contains(&p.voice))
                .cloned()
                .collect(),
        }
    }

    pub fn total_quarters(&self) -> f32 {
        self.parts
            .iter()
            .map(Part::total_quarters)
            .fold(0.0, f32::max)
    }
}

/// Per-voice summary for the analysis document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSummary {
    pub voice: Voice,
    pub notes: usize,
    pub rests: usize,
    pub lowest: Option<String>,
    pub highest: Option<String>,
}

/// Top-level analysis document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub sample_rate: u32,
    pub duration_sec: f32,
    pub onset_count: usize,
    pub onset_times_sec: Vec<f32>,
    pub assigned_onsets: usize,
    pub key: Option<KeyDetection>,
    pub tempo_bpm: f32,
    pub voices: Vec<VoiceSummary>,
}

/// Export analysis results to `{basename}_analysis.json`
pub fn export_analysis(state: &AudioState, output_dir: &Path, basename: &str) -> crate::SatbResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let analysis_path = output_dir.join(format!("{}_analysis.json", basename));
    let analysis = build_analysis_results(state);

    let json = serde_json::to_string_pretty(&analysis)?;
    std::fs::write(&analysis_path, json)?;

    tracing::info!("Exported analysis results to {}", analysis_path.display());
    Ok(analysis_path)
}

/// Build the analysis document from pipeline state
pub fn build_analysis_results(state: &AudioState) -> AnalysisResults {
    let voices = match &state.score {
        Some(score) => score
            .parts
            .iter()
            .map(|part| {
                let span = part.pitch_span();
                VoiceSummary {
                    voice: part.voice,
                    notes: part.note_count(),
                    rests: part.rest_count(),
                    lowest: span.map(|(lo, _)| midi_to_name(lo)),
                    highest: span.map(|(_, hi)| midi_to_name(hi)),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    AnalysisResults {
        sample_rate: state.sr,
        duration_sec: state.duration_sec(),
        onset_count: state.onsets.len(),
        onset_times_sec: state.onsets.iter().map(|o| o.time_sec).collect(),
        assigned_onsets: state.assignments.as_ref().map_or(0, Vec::len),
        key: state.key.clone(),
        tempo_bpm: state
            .score
            .as_ref()
            .map(|s| s.tempo_bpm)
            .unwrap_or(state.config.rhythm.tempo_bpm),
        voices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ranges() {
        assert_eq!(Voice::Soprano.default_range(), VocalRange { low: 60, high: 83 });
        assert_eq!(Voice::Bass.default_range(), VocalRange { low: 36, high: 60 });
        assert!(Voice::Tenor.default_range().contains(69));
        assert!(!Voice::Tenor.default_range().contains(70));
    }

    #[test]
    fn test_voice_parse_and_order() {
        assert_eq!("Alto".parse::<Voice>().unwrap(), Voice::Alto);
        assert_eq!("b".parse::<Voice>().unwrap(), Voice::Bass);
        assert!("baritone".parse::<Voice>().is_err());
        let names: Vec<_> = Voice::ALL.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["soprano", "alto", "tenor", "bass"]);
    }

    #[test]
    fn test_part_statistics() {
        let mut part = Part::new(Voice::Alto);
        part.events.push(VoiceEvent::Note { midi: 57, duration: 1.0, solfege: None });
        part.events.push(VoiceEvent::Rest { duration: 1.0 });
        part.events.push(VoiceEvent::Note { midi: 64, duration: 2.0, solfege: None });
        assert_eq!(part.note_count(), 2);
        assert_eq!(part.rest_count(), 1);
        assert_eq!(part.total_quarters(), 4.0);
        assert_eq!(part.pitch_span(), Some((57, 64)));
    }

    #[test]
    fn test_score_select_keeps_order() {
        let score = Score::new("t", 120.0, 4);
        let sub = score.select(&[Voice::Bass, Voice::Soprano]);
        let voices: Vec<_> = sub.parts.iter().map(|p| p.voice).collect();
        assert_eq!(voices, vec![Voice::Soprano, Voice::Bass]);
    }
}
