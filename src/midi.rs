//! MIDI export functionality

use crate::analysis::{Score, Voice, VoiceEvent};
use crate::error::{Result as SatbResult, SatbError};
use crate::OutputFiles;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::path::Path;

/// Pulses per quarter note
pub const PPQ: u16 = 960;

/// Quarter-note length to ticks
pub fn quarters_to_ticks(quarters: f32) -> u32 {
    (quarters * PPQ as f32).round().max(0.0) as u32
}

/// Serialize a score as a format 1 SMF: a conductor track then one track per part
pub fn score_to_smf_bytes(score: &Score, velocity: u8) -> SatbResult<Vec<u8>> {
    let mut tracks = vec![conductor_track(score)];
    for part in &score.parts {
        tracks.push(part_track(part.voice, &part.events, velocity));
    }
    write_smf(tracks)
}

/// Serialize a single part with the same conductor track
pub fn part_to_smf_bytes(score: &Score, voice: Voice, velocity: u8) -> SatbResult<Vec<u8>> {
    let part = score.part(voice).ok_or_else(|| {
        SatbError::MidiExportError(format!("score has no {} part", voice.name()))
    })?;
    write_smf(vec![conductor_track(score), part_track(voice, &part.events, velocity)])
}

/// Merge several SMF files into one: the first file's conductor track, then every
/// other track of every file
pub fn merge_smf(files: &[Vec<u8>]) -> SatbResult<Vec<u8>> {
    let mut merged: Vec<Track> = Vec::new();
    for (idx, bytes) in files.iter().enumerate() {
        let smf = Smf::parse(bytes)
            .map_err(|e| SatbError::MidiExportError(format!("Failed to parse MIDI data: {}", e)))?;
        let skip = if idx == 0 || smf.tracks.len() < 2 { 0 } else { 1 };
        merged.extend(smf.tracks.into_iter().skip(skip));
    }
    if merged.is_empty() {
        return Err(SatbError::MidiExportError("nothing to merge".to_string()));
    }
    write_smf(merged)
}

/// Write `{base}_satb.mid` and `{base}_{voice}.mid`
pub fn export_midi(
    score: &Score,
    output_dir: &Path,
    basename: &str,
    velocity: u8,
) -> SatbResult<OutputFiles> {
    std::fs::create_dir_all(output_dir)?;
    let mut files = OutputFiles::new();

    let score_path = output_dir.join(format!("{}_satb.mid", basename));
    std::fs::write(&score_path, score_to_smf_bytes(score, velocity)?)?;
    files.insert("score_midi".to_string(), score_path);

    for part in &score.parts {
        let path = output_dir.join(format!("{}_{}.mid", basename, part.voice.name()));
        std::fs::write(&path, part_to_smf_bytes(score, part.voice, velocity)?)?;
        files.insert(format!("{}_midi", part.voice.name()), path);
    }

    tracing::info!("Exported {} MIDI files to {}", files.len(), output_dir.display());
    Ok(files)
}

fn conductor_track(score: &Score) -> Track<'_> {
    let tempo_uspq = (60_000_000.0 / score.tempo_bpm.max(1.0)) as u32;
    vec![
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(score.title.as_bytes())),
        },
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_uspq))),
        },
        TrackEvent {
            delta: u28::from(0),
            // Quarter-note beats: denominator is 2^2
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(score.beats_per_measure, 2, 24, 8)),
        },
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

fn part_track(voice: Voice, events: &[VoiceEvent], velocity: u8) -> Track<'static> {
    let channel = u4::from(voice.index() as u8);
    let mut track = vec![
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(voice.display_name().as_bytes())),
        },
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from(voice.midi_program()),
                },
            },
        },
    ];

    // Rests only push the next event further out
    let mut pending = 0u32;
    for event in events {
        let ticks = quarters_to_ticks(event.duration());
        match event.midi() {
            Some(note) => {
                track.push(TrackEvent {
                    delta: u28::from(pending),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key: u7::from(note),
                            vel: u7::from(velocity),
                        },
                    },
                });
                track.push(TrackEvent {
                    delta: u28::from(ticks),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key: u7::from(note),
                            vel: u7::from(0),
                        },
                    },
                });
                pending = 0;
            }
            None => pending += ticks,
        }
    }

    track.push(TrackEvent {
        delta: u28::from(pending),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn write_smf(tracks: Vec<Track<'_>>) -> SatbResult<Vec<u8>> {
    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::from(PPQ)),
        },
        tracks,
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| SatbError::MidiExportError(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_note_score() -> Score {
        let mut score = Score::new("Test", 120.0, 4);
        for part in score.parts.iter_mut() {
            part.events.push(VoiceEvent::Rest { duration: 1.0 });
        }
        score.parts[0].events.push(VoiceEvent::Note { midi: 72, duration: 2.0, solfege: None });
        score
    }

    fn notes(track: &Track) -> Vec<(u32, u8, bool)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for ev in track {
            tick += ev.delta.as_int();
            if let TrackEventKind::Midi { message, .. } = ev.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } => out.push((tick, key.as_int(), true)),
                    MidiMessage::NoteOff { key, .. } => out.push((tick, key.as_int(), false)),
                    _ => {}
                }
            }
        }
        out
    }

    #[test]
    fn test_score_layout() {
        let bytes = score_to_smf_bytes(&two_note_score(), 80).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(PPQ)));
        assert_eq!(smf.tracks.len(), 5);
        // Rest then a half note
        assert_eq!(notes(&smf.tracks[1]), vec![(960, 72, true), (2880, 72, false)]);
        assert!(notes(&smf.tracks[2]).is_empty());
    }

    #[test]
    fn test_tempo_and_program() {
        let bytes = part_to_smf_bytes(&two_note_score(), Voice::Tenor, 80).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        let tempo = smf.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(500_000));
        let program = smf.tracks[1].iter().find_map(|e| match e.kind {
            TrackEventKind::Midi { channel, message: MidiMessage::ProgramChange { program } } => {
                Some((channel.as_int(), program.as_int()))
            }
            _ => None,
        });
        assert_eq!(program, Some((2, 53)));
    }

    #[test]
    fn test_merge_keeps_one_conductor() {
        let score = two_note_score();
        let s = part_to_smf_bytes(&score, Voice::Soprano, 80).unwrap();
        let b = part_to_smf_bytes(&score, Voice::Bass, 80).unwrap();
        let merged = merge_smf(&[s, b]).unwrap();
        assert_eq!(Smf::parse(&merged).unwrap().tracks.len(), 3);
    }
}
