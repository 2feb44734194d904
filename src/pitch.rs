//! Pitch math, spelling, key estimation and solfège

use serde::{Deserialize, Serialize};
use std::str::FromStr;

const NOTE_NAMES_SHARP: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const NOTE_NAMES_FLAT: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// Pitch classes conventionally spelled with flats
const FLAT_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10];

/// Chromatic solfège, ascending from do
const SOLFEGE_SYLLABLES: [&str; 12] = [
    "do", "di", "re", "ri", "mi", "fa", "fi", "sol", "si", "la", "li", "ti",
];

/// Krumhansl-Kessler major key profile
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Convert frequency in Hz to a fractional MIDI note number
pub fn hz_to_midi(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Convert a MIDI note number to frequency in Hz
pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2.0f32.powf((midi - 69.0) / 12.0)
}

/// Scientific pitch name using sharps, e.g. 60 -> "C4"
pub fn midi_to_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES_SHARP[(midi % 12) as usize], octave)
}

/// Notation spelling as (step, alter, octave)
///
/// Sharps are used for black keys unless `prefer_flats` is set.
pub fn spell(midi: u8, prefer_flats: bool) -> (char, i8, i32) {
    let pc = midi % 12;
    let octave = midi as i32 / 12 - 1;
    let name = if prefer_flats {
        NOTE_NAMES_FLAT[pc as usize]
    } else {
        NOTE_NAMES_SHARP[pc as usize]
    };
    let mut chars = name.chars();
    let step = chars.next().unwrap_or('C');
    let alter = match chars.next() {
        Some('#') => 1,
        Some('b') => -1,
        _ => 0,
    };
    (step, alter, octave)
}

/// Major or minor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Major,
    Minor,
}

/// Estimated key of a transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDetection {
    pub root: String,
    pub root_pitch_class: u8,
    pub mode: KeyMode,
    pub confidence: f64,
}

impl Default for KeyDetection {
    fn default() -> Self {
        Self {
            root: "C".into(),
            root_pitch_class: 0,
            mode: KeyMode::Major,
            confidence: 0.0,
        }
    }
}

impl KeyDetection {
    /// Pitch class that sings as `do` in movable solfège (la-based minor)
    pub fn do_pitch_class(&self) -> u8 {
        match self.mode {
            KeyMode::Major => self.root_pitch_class,
            KeyMode::Minor => (self.root_pitch_class + 3) % 12,
        }
    }

    /// Position on the circle of fifths of the relative major, in -6..=6
    pub fn fifths(&self) -> i8 {
        let major = self.do_pitch_class() as i32;
        // 7 semitones per fifth; 7 is its own inverse mod 12
        let mut fifths = (major * 7).rem_euclid(12);
        if fifths > 6 {
            fifths -= 12;
        }
        fifths as i8
    }

    /// Whether accidentals in this key read better as flats
    pub fn prefers_flats(&self) -> bool {
        self.fifths() < 0
    }
}

/// Detect the key of a pitch collection using the Krumhansl-Schmuckler algorithm
///
/// Each pitch counts once; repeated notes weigh more. Empty input yields C major
/// with zero confidence.
pub fn detect_key(pitches: &[u8]) -> KeyDetection {
    if pitches.is_empty() {
        return KeyDetection::default();
    }

    let mut histogram = [0.0_f64; 12];
    for &p in pitches {
        histogram[(p % 12) as usize] += 1.0;
    }
    let total: f64 = histogram.iter().sum();
    for h in &mut histogram {
        *h /= total;
    }

    let mut best_root: u8 = 0;
    let mut best_mode = KeyMode::Major;
    let mut best_corr = -1.0_f64;

    for root in 0..12u8 {
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + root as usize) % 12];
        }

        let major_corr = pearson(&rotated, &MAJOR_PROFILE);
        if major_corr > best_corr {
            best_corr = major_corr;
            best_root = root;
            best_mode = KeyMode::Major;
        }

        let minor_corr = pearson(&rotated, &MINOR_PROFILE);
        if minor_corr > best_corr {
            best_corr = minor_corr;
            best_root = root;
            best_mode = KeyMode::Minor;
        }
    }

    let root = if FLAT_ROOTS.contains(&best_root) {
        NOTE_NAMES_FLAT[best_root as usize].to_string()
    } else {
        NOTE_NAMES_SHARP[best_root as usize].to_string()
    };

    KeyDetection {
        root,
        root_pitch_class: best_root,
        mode: best_mode,
        confidence: (best_corr * 10000.0).round() / 10000.0,
    }
}

fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}

/// Solfège labelling scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolfegeSystem {
    None,
    /// C is always do
    Fixed,
    /// The tonic of the detected key is do
    Movable,
}

impl FromStr for SolfegeSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "" => Ok(SolfegeSystem::None),
            "fixed" => Ok(SolfegeSystem::Fixed),
            "movable" | "moveable" => Ok(SolfegeSystem::Movable),
            other => Err(format!("unknown solfege system: {}", other)),
        }
    }
}

impl SolfegeSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolfegeSystem::None => "none",
            SolfegeSystem::Fixed => "fixed",
            SolfegeSystem::Movable => "movable",
        }
    }

    /// Syllable for a MIDI pitch, or None when labelling is disabled
    pub fn syllable(&self, midi: u8, key: &KeyDetection) -> Option<&'static str> {
        match self {
            SolfegeSystem::None => None,
            SolfegeSystem::Fixed => Some(SOLFEGE_SYLLABLES[(midi % 12) as usize]),
            SolfegeSystem::Movable => {
                let degree = (midi % 12 + 12 - key.do_pitch_class()) % 12;
                Some(SOLFEGE_SYLLABLES[degree as usize])
            }
        }
    }
}
