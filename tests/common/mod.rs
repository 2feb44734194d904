//! Synthetic choral signals shared by the integration tests
#![allow(dead_code)]

use satb::pitch::midi_to_hz;
use std::f32::consts::PI;
use std::path::Path;

pub const SR: u32 = 22050;

/// I - IV64 - V - I in G major, SATB from the top
pub const PROGRESSION: [[u8; 4]; 4] = [
    [79, 71, 62, 55],
    [76, 72, 64, 48],
    [78, 69, 62, 50],
    [79, 71, 62, 43],
];

/// Chord onsets of [`progression`] in seconds
pub const PROGRESSION_ONSETS: [f32; 4] = [0.25, 0.75, 1.25, 1.75];

fn gain(i: usize, start: usize, end: usize, fade_in: usize, fade_out: usize) -> f32 {
    let mut g = 1.0;
    if i - start < fade_in {
        g *= (0.5 * PI * (i - start) as f32 / fade_in as f32).sin().powi(2);
    }
    if end - i < fade_out {
        g *= (0.5 * PI * (end - i) as f32 / fade_out as f32).sin().powi(2);
    }
    g
}

/// Sum of sustained chords, each `(midi pitches, start sec, end sec)`, 0.2 per tone
pub fn chords(segments: &[(&[u8], f32, f32)], duration: f32, sr: u32) -> Vec<f32> {
    let n = (duration * sr as f32) as usize;
    let mut y = vec![0.0f32; n];
    let fade_in = (0.01 * sr as f32) as usize;
    let fade_out = (0.05 * sr as f32) as usize;

    for (pitches, start, end) in segments {
        let a = (start * sr as f32) as usize;
        let b = ((end * sr as f32) as usize).min(n);
        let freqs: Vec<f32> = pitches.iter().map(|&m| midi_to_hz(m as f32)).collect();
        for (i, sample) in y.iter_mut().enumerate().take(b).skip(a) {
            let t = i as f32 / sr as f32;
            let g = gain(i, a, b, fade_in, fade_out);
            *sample += g * freqs.iter().map(|f| 0.2 * (2.0 * PI * f * t).sin()).sum::<f32>();
        }
    }
    y
}

/// One G major chord from 0.3 s to 1.8 s in two seconds of audio
pub fn single_chord(sr: u32) -> Vec<f32> {
    chords(&[(&PROGRESSION[0][..], 0.3, 1.8)], 2.0, sr)
}

/// The four chords of [`PROGRESSION`], half a second each
pub fn progression(sr: u32) -> Vec<f32> {
    let segments: Vec<(&[u8], f32, f32)> = PROGRESSION
        .iter()
        .zip(PROGRESSION_ONSETS)
        .map(|(chord, start)| (&chord[..], start, start + 0.5))
        .collect();
    chords(&segments, 2.5, sr)
}

/// Steady sine
pub fn sine(freq: f32, amplitude: f32, duration: f32, sr: u32) -> Vec<f32> {
    let n = (duration * sr as f32) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sr as f32).sin())
        .collect()
}

/// Write mono 16-bit PCM
pub fn write_wav(path: &Path, samples: &[f32], sr: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}
