//! MusicXML export
//!
//! Scores are written as `score-partwise` 4.0 documents with four divisions per
//! quarter note. Events that cross a barline, or whose length has no single
//! note value, are split into tied pieces.

use crate::analysis::{Clef, Part, Score, Voice, VoiceEvent};
use crate::error::Result as SatbResult;
use crate::pitch::{spell, KeyMode};
use crate::OutputFiles;
use std::fmt::Write;
use std::path::Path;

/// Divisions per quarter note
pub const DIVISIONS: u32 = 4;

/// Note values expressible without ties, longest first: (divisions, type, dotted)
const NOTE_VALUES: [(u32, &str, bool); 8] = [
    (16, "whole", false),
    (12, "half", true),
    (8, "half", false),
    (6, "quarter", true),
    (4, "quarter", false),
    (3, "eighth", true),
    (2, "eighth", false),
    (1, "16th", false),
];

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
"#;

/// One printable piece of an event inside a single measure
#[derive(Debug, Clone, PartialEq)]
struct Piece<'a> {
    midi: Option<u8>,
    divisions: u32,
    tie_start: bool,
    tie_stop: bool,
    lyric: Option<&'a str>,
}

/// Whole score as a MusicXML string
pub fn score_to_musicxml(score: &Score) -> String {
    render_document(score, &score.parts)
}

/// A single voice as a standalone MusicXML string
pub fn part_to_musicxml(score: &Score, voice: Voice) -> String {
    let parts: Vec<Part> = score.part(voice).cloned().into_iter().collect();
    render_document(score, &parts)
}

/// Write `{base}_satb.musicxml` and `{base}_{voice}.musicxml`
pub fn export_musicxml(score: &Score, output_dir: &Path, basename: &str) -> SatbResult<OutputFiles> {
    std::fs::create_dir_all(output_dir)?;
    let mut files = OutputFiles::new();

    let score_path = output_dir.join(format!("{}_satb.musicxml", basename));
    std::fs::write(&score_path, score_to_musicxml(score))?;
    files.insert("score".to_string(), score_path);

    for part in &score.parts {
        let path = output_dir.join(format!("{}_{}.musicxml", basename, part.voice.name()));
        std::fs::write(&path, part_to_musicxml(score, part.voice))?;
        files.insert(part.voice.name().to_string(), path);
    }

    tracing::info!("Exported {} MusicXML files to {}", files.len(), output_dir.display());
    Ok(files)
}

/// Split a length in divisions into note values, longest first
fn split_value(mut divisions: u32) -> Vec<u32> {
    let mut out = Vec::new();
    while divisions > 0 {
        let value = NOTE_VALUES
            .iter()
            .map(|(d, _, _)| *d)
            .find(|&d| d <= divisions)
            .unwrap_or(1);
        out.push(value);
        divisions -= value;
    }
    out
}

fn note_type(divisions: u32) -> (&'static str, bool) {
    NOTE_VALUES
        .iter()
        .find(|(d, _, _)| *d == divisions)
        .map(|(_, name, dotted)| (*name, *dotted))
        .unwrap_or(("16th", false))
}

/// Lay a part's events into measures of `measure_len` divisions
fn layout_measures(events: &[VoiceEvent], measure_len: u32) -> Vec<Vec<Piece<'_>>> {
    let mut measures: Vec<Vec<Piece>> = vec![Vec::new()];
    let mut pos = 0u32;

    for event in events {
        let total = ((event.duration() * DIVISIONS as f32).round() as u32).max(1);
        let (midi, lyric) = match event {
            VoiceEvent::Note { midi, solfege, .. } => (Some(*midi), solfege.as_deref()),
            VoiceEvent::Rest { .. } => (None, None),
        };

        let mut chunks = Vec::new();
        let mut remaining = total;
        while remaining > 0 {
            if pos == measure_len {
                measures.push(Vec::new());
                pos = 0;
            }
            let take = remaining.min(measure_len - pos);
            for value in split_value(take) {
                chunks.push((measures.len() - 1, value));
            }
            pos += take;
            remaining -= take;
        }

        let last = chunks.len() - 1;
        for (i, (measure_idx, value)) in chunks.into_iter().enumerate() {
            let tied = midi.is_some();
            measures[measure_idx].push(Piece {
                midi,
                divisions: value,
                tie_start: tied && i < last,
                tie_stop: tied && i > 0,
                lyric: if i == 0 { lyric } else { None },
            });
        }
    }

    // Fill the last bar with rests
    if pos > 0 && pos < measure_len {
        if let Some(measure) = measures.last_mut() {
            for value in split_value(measure_len - pos) {
                measure.push(Piece { midi: None, divisions: value, tie_start: false, tie_stop: false, lyric: None });
            }
        }
    }

    measures
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_document(score: &Score, parts: &[Part]) -> String {
    let mut xml = String::from(HEADER);
    xml.push_str("<score-partwise version=\"4.0\">\n");
    let _ = writeln!(xml, "  <work><work-title>{}</work-title></work>", escape(&score.title));
    xml.push_str("  <identification><encoding><software>satb</software></encoding></identification>\n");

    xml.push_str("  <part-list>\n");
    for (idx, part) in parts.iter().enumerate() {
        let id = format!("P{}", idx + 1);
        let name = part.voice.display_name();
        let _ = writeln!(xml, "    <score-part id=\"{}\">", id);
        let _ = writeln!(xml, "      <part-name>{}</part-name>", name);
        let _ = writeln!(
            xml,
            "      <score-instrument id=\"{id}-I1\"><instrument-name>{name}</instrument-name></score-instrument>"
        );
        let _ = writeln!(
            xml,
            "      <midi-instrument id=\"{}-I1\"><midi-channel>{}</midi-channel><midi-program>{}</midi-program></midi-instrument>",
            id,
            part.voice.index() + 1,
            part.voice.midi_program() + 1
        );
        xml.push_str("    </score-part>\n");
    }
    xml.push_str("  </part-list>\n");

    for (idx, part) in parts.iter().enumerate() {
        render_part(&mut xml, score, part, idx + 1);
    }

    xml.push_str("</score-partwise>\n");
    xml
}

fn render_part(xml: &mut String, score: &Score, part: &Part, number: usize) {
    let measure_len = score.beats_per_measure.max(1) as u32 * DIVISIONS;
    let prefer_flats = score.key.prefers_flats();
    let measures = layout_measures(&part.events, measure_len);

    let _ = writeln!(xml, "  <part id=\"P{}\">", number);
    for (m, pieces) in measures.iter().enumerate() {
        let _ = writeln!(xml, "    <measure number=\"{}\">", m + 1);
        if m == 0 {
            render_attributes(xml, score, part.voice);
        }

        if pieces.is_empty() {
            let _ = writeln!(
                xml,
                "      <note><rest measure=\"yes\"/><duration>{}</duration><voice>1</voice></note>",
                measure_len
            );
        }

        for piece in pieces {
            render_piece(xml, piece, prefer_flats);
        }
        xml.push_str("    </measure>\n");
    }
    xml.push_str("  </part>\n");
}

fn render_attributes(xml: &mut String, score: &Score, voice: Voice) {
    let mode = match score.key.mode {
        KeyMode::Major => "major",
        KeyMode::Minor => "minor",
    };
    xml.push_str("      <attributes>\n");
    let _ = writeln!(xml, "        <divisions>{}</divisions>", DIVISIONS);
    let _ = writeln!(
        xml,
        "        <key><fifths>{}</fifths><mode>{}</mode></key>",
        score.key.fifths(),
        mode
    );
    let _ = writeln!(
        xml,
        "        <time><beats>{}</beats><beat-type>4</beat-type></time>",
        score.beats_per_measure
    );
    let clef = match voice.clef() {
        Clef::Treble => "<sign>G</sign><line>2</line>",
        Clef::TrebleOctaveDown => "<sign>G</sign><line>2</line><clef-octave-change>-1</clef-octave-change>",
        Clef::Bass => "<sign>F</sign><line>4</line>",
    };
    let _ = writeln!(xml, "        <clef>{}</clef>", clef);
    xml.push_str("      </attributes>\n");

    let bpm = score.tempo_bpm.round() as u32;
    let _ = writeln!(
        xml,
        "      <direction placement=\"above\"><direction-type><metronome><beat-unit>quarter</beat-unit><per-minute>{bpm}</per-minute></metronome></direction-type><sound tempo=\"{bpm}\"/></direction>"
    );
}

fn render_piece(xml: &mut String, piece: &Piece, prefer_flats: bool) {
    let (type_name, dotted) = note_type(piece.divisions);
    xml.push_str("      <note>");

    match piece.midi {
        Some(midi) => {
            let (step, alter, octave) = spell(midi, prefer_flats);
            xml.push_str("<pitch>");
            let _ = write!(xml, "<step>{}</step>", step);
            if alter != 0 {
                let _ = write!(xml, "<alter>{}</alter>", alter);
            }
            let _ = write!(xml, "<octave>{}</octave></pitch>", octave);
        }
        None => xml.push_str("<rest/>"),
    }

    let _ = write!(xml, "<duration>{}</duration>", piece.divisions);
    if piece.tie_stop {
        xml.push_str("<tie type=\"stop\"/>");
    }
    if piece.tie_start {
        xml.push_str("<tie type=\"start\"/>");
    }
    let _ = write!(xml, "<voice>1</voice><type>{}</type>", type_name);
    if dotted {
        xml.push_str("<dot/>");
    }

    if piece.tie_start || piece.tie_stop {
        xml.push_str("<notations>");
        if piece.tie_stop {
            xml.push_str("<tied type=\"stop\"/>");
        }
        if piece.tie_start {
            xml.push_str("<tied type=\"start\"/>");
        }
        xml.push_str("</notations>");
    }

    if let Some(text) = piece.lyric {
        let _ = write!(
            xml,
            "<lyric number=\"1\"><syllabic>single</syllabic><text>{}</text></lyric>",
            escape(text)
        );
    }
    xml.push_str("</note>\n");
}
