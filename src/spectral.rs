//! Spectral processing utilities (STFT, harmonic separation, onset envelope)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
    /// Sum of the analysis window, used for amplitude scaling
    pub window_sum: f32,
}

impl StftData {
    pub fn n_bins(&self) -> usize {
        self.s.shape()[0]
    }

    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }
}

/// Compute a centered STFT of an audio signal
///
/// The signal is zero-padded by `n_fft / 2` on both sides so frame `t`
/// is centered on sample `t * hop_length`.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, window: &str, sample_rate: u32) -> StftData {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; y.len() + 2 * pad];
    padded[pad..pad + y.len()].copy_from_slice(y);
    if padded.len() < n_fft {
        padded.resize(n_fft, 0.0);
    }

    let n_frames = (padded.len() - n_fft) / hop_length + 1;
    let n_bins = n_fft / 2 + 1;
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));

    let window_fn = generate_window(window, n_fft);
    let window_sum = window_fn.iter().sum::<f32>();

    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;

        for (slot, (&sample, &win)) in frame
            .iter_mut()
            .zip(padded[start..start + n_fft].iter().zip(&window_fn))
        {
            *slot = Complex32::new(sample * win, 0.0);
        }

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    let freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let times: Vec<f32> = (0..n_frames)
        .map(|i| frames_to_time(i, hop_length, sample_rate))
        .collect();

    StftData {
        s,
        freqs,
        times,
        window_sum,
    }
}

/// Generate window function
pub fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        // Periodic Hann, the usual choice for spectral analysis
        "hann" => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect(),
        _ => vec![1.0; size],
    }
}

/// Magnitude spectrogram scaled so a sinusoid of amplitude `A` peaks near `A`
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    let scale = if stft_data.window_sum > 0.0 {
        2.0 / stft_data.window_sum
    } else {
        1.0
    };
    stft_data.s.map(|c| c.norm() * scale)
}

/// Convert a frame index to seconds
pub fn frames_to_time(frame: usize, hop_length: usize, sample_rate: u32) -> f32 {
    frame as f32 * hop_length as f32 / sample_rate as f32
}

/// Median of a scratch buffer (reorders it)
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median filter each frequency row across time
pub fn median_filter_time(mag: &Array2<f32>, kernel: usize) -> Array2<f32> {
    let (n_bins, n_frames) = mag.dim();
    let half = kernel / 2;
    let mut out = Array2::<f32>::zeros((n_bins, n_frames));
    let mut scratch = Vec::with_capacity(kernel);

    for f in 0..n_bins {
        let row = mag.row(f);
        for t in 0..n_frames {
            let start = t.saturating_sub(half);
            let end = (t + half + 1).min(n_frames);
            scratch.clear();
            scratch.extend(row.iter().skip(start).take(end - start).copied());
            out[[f, t]] = median(&mut scratch);
        }
    }

    out
}

/// Median filter each frame across frequency
pub fn median_filter_freq(mag: &Array2<f32>, kernel: usize) -> Array2<f32> {
    let (n_bins, n_frames) = mag.dim();
    let half = kernel / 2;
    let mut out = Array2::<f32>::zeros((n_bins, n_frames));
    let mut scratch = Vec::with_capacity(kernel);

    for t in 0..n_frames {
        let col = mag.column(t);
        for f in 0..n_bins {
            let start = f.saturating_sub(half);
            let end = (f + half + 1).min(n_bins);
            scratch.clear();
            scratch.extend(col.iter().skip(start).take(end - start).copied());
            out[[f, t]] = median(&mut scratch);
        }
    }

    out
}

/// Split a magnitude spectrogram into harmonic and percussive parts
///
/// Median filtering across time enhances sustained partials, across frequency
/// enhances broadband transients. The components are soft masks of the input,
/// so `H + P == mag` wherever either filter is non-zero.
pub fn harmonic_percussive(
    mag: &Array2<f32>,
    kernel_harmonic: usize,
    kernel_percussive: usize,
    power: f32,
) -> (Array2<f32>, Array2<f32>) {
    let h_filt = median_filter_time(mag, kernel_harmonic);
    let p_filt = median_filter_freq(mag, kernel_percussive);

    let mut harmonic = Array2::<f32>::zeros(mag.dim());
    let mut percussive = Array2::<f32>::zeros(mag.dim());

    for ((idx, &x), (&h, &p)) in mag.indexed_iter().zip(h_filt.iter().zip(p_filt.iter())) {
        let hp = h.powf(power);
        let pp = p.powf(power);
        let denom = hp + pp;
        if denom <= f32::EPSILON {
            continue;
        }
        harmonic[idx] = x * hp / denom;
        percussive[idx] = x * pp / denom;
    }

    (harmonic, percussive)
}

/// Onset strength envelope from log-magnitude spectral flux
///
/// Magnitudes are converted to dB and floored at `db_range` below the
/// spectrogram maximum; the envelope is the mean positive difference
/// between consecutive frames. Frame 0 has zero strength.
pub fn onset_strength(mag: &Array2<f32>, db_range: f32) -> Vec<f32> {
    let (n_bins, n_frames) = mag.dim();
    let mut envelope = vec![0.0; n_frames];
    if n_bins == 0 || n_frames < 2 {
        return envelope;
    }

    let log_spec = mag.map(|&m| 20.0 * m.max(1e-10).log10());
    let max_db = log_spec.iter().fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let floor = max_db - db_range;
    let log_spec = log_spec.map(|&x| x.max(floor));

    for t in 1..n_frames {
        let mut frame_flux = 0.0;
        for f in 0..n_bins {
            let diff = log_spec[[f, t]] - log_spec[[f, t - 1]];
            if diff > 0.0 {
                frame_flux += diff;
            }
        }
        envelope[t] = frame_flux / n_bins as f32;
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, amp: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_stft_shape_and_frames() {
        let y = vec![0.0; 22050];
        let data = stft(&y, 2048, 512, "hann", 22050);
        assert_eq!(data.n_bins(), 1025);
        // Centered framing: 1 + len / hop
        assert_eq!(data.n_frames(), 1 + 22050 / 512);
        assert!((data.times[2] - 1024.0 / 22050.0).abs() < 1e-6);
    }

    #[test]
    fn test_stft_short_signal_pads() {
        let data = stft(&[0.5; 10], 2048, 512, "hann", 22050);
        assert_eq!(data.n_frames(), 1);
    }

    #[test]
    fn test_magnitude_scaling_matches_amplitude() {
        let sr = 22050;
        let n_fft = 2048;
        // Bin-centred frequency so there is no scalloping loss
        let freq = 100.0 * sr as f32 / n_fft as f32;
        let y = sine(freq, 0.5, sr, sr as usize);
        let data = stft(&y, n_fft, 512, "hann", sr);
        let mag = magnitude_spectrogram(&data);
        let mid = data.n_frames() / 2;
        assert!((mag[[100, mid]] - 0.5).abs() < 0.02, "got {}", mag[[100, mid]]);
    }

    #[test]
    fn test_median_filters() {
        let mut mag = Array2::<f32>::zeros((5, 5));
        mag[[2, 2]] = 10.0;
        // A lone spike is removed by both filters
        assert_eq!(median_filter_time(&mag, 3)[[2, 2]], 0.0);
        assert_eq!(median_filter_freq(&mag, 3)[[2, 2]], 0.0);

        // A sustained row survives the time filter
        let mut sustained = Array2::<f32>::zeros((5, 5));
        for t in 0..5 {
            sustained[[1, t]] = 3.0;
        }
        assert_eq!(median_filter_time(&sustained, 3)[[1, 2]], 3.0);
    }

    #[test]
    fn test_hpss_sustained_tone_is_harmonic() {
        let sr = 22050;
        let y = sine(440.0, 0.8, sr, sr as usize);
        let data = stft(&y, 2048, 512, "hann", sr);
        let mag = magnitude_spectrogram(&data);
        let (h, p) = harmonic_percussive(&mag, 31, 31, 2.0);
        let h_energy: f32 = h.iter().sum();
        let p_energy: f32 = p.iter().sum();
        assert!(h_energy > 4.0 * p_energy);
    }

    #[test]
    fn test_onset_strength_rises_at_tone_start() {
        let sr = 22050;
        let mut y = vec![0.0; sr as usize];
        for (i, s) in sine(330.0, 0.5, sr, sr as usize / 2).into_iter().enumerate() {
            y[sr as usize / 2 + i] = s;
        }
        let data = stft(&y, 2048, 512, "hann", sr);
        let env = onset_strength(&magnitude_spectrogram(&data), 80.0);
        let peak_frame = env
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let peak_time = frames_to_time(peak_frame, 512, sr);
        assert!((peak_time - 0.5).abs() < 0.08, "peak at {}", peak_time);
    }
}
