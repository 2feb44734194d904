//! Microphone capture to WAV

use crate::error::{Result as SatbResult, SatbError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig};
use hound::{WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Longest capture accepted, one hour
pub const MAX_RECORDING_SEC: f32 = 3600.0;

fn rec_err(e: impl std::fmt::Display) -> SatbError {
    SatbError::RecordingError(e.to_string())
}

/// Prefer a device configuration at `sample_rate`, else the device default
fn pick_config(device: &Device, sample_rate: u32) -> SatbResult<SupportedStreamConfig> {
    let preferred = device
        .supported_input_configs()
        .map_err(rec_err)?
        .filter(|range| matches!(range.sample_format(), SampleFormat::F32 | SampleFormat::I16 | SampleFormat::I32))
        .find(|range| range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0)
        .map(|range| range.with_sample_rate(SampleRate(sample_rate)));

    match preferred {
        Some(config) => Ok(config),
        None => device.default_input_config().map_err(rec_err),
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
) -> SatbResult<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|s| f32::from_sample_(*s)));
                }
            },
            |err| tracing::error!("Input stream error: {}", err),
            None,
        )
        .map_err(rec_err)
}

/// Capture length for `duration_sec`; must be finite, positive and at most [`MAX_RECORDING_SEC`]
pub fn recording_duration(duration_sec: f32) -> SatbResult<Duration> {
    if !duration_sec.is_finite() || duration_sec <= 0.0 || duration_sec > MAX_RECORDING_SEC {
        return Err(SatbError::RecordingError(format!(
            "duration must be between 0 and {} seconds, got {}",
            MAX_RECORDING_SEC, duration_sec
        )));
    }
    Ok(Duration::from_secs_f32(duration_sec))
}

/// Record `duration_sec` seconds from the default input device into a 16-bit stereo WAV
pub fn record_to_wav(path: &Path, duration_sec: f32, sample_rate: u32) -> SatbResult<PathBuf> {
    let duration = recording_duration(duration_sec)?;
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SatbError::RecordingError("no audio input device".to_string()))?;

    let supported = pick_config(&device, sample_rate)?;
    let channels = supported.channels().max(1) as usize;
    let actual_rate = supported.sample_rate().0;
    let stream_config: StreamConfig = supported.config();

    tracing::info!(
        "Recording {:.1}s from {} at {} Hz",
        duration_sec,
        device.name().unwrap_or_default(),
        actual_rate
    );

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, buffer.clone()),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, buffer.clone()),
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, buffer.clone()),
        format => Err(SatbError::RecordingError(format!("Unsupported format: {:?}", format))),
    }?;

    stream.play().map_err(rec_err)?;
    std::thread::sleep(duration);
    drop(stream);

    let samples = buffer.lock().map_err(rec_err)?.clone();
    write_stereo_wav(path, &samples, channels, actual_rate)?;

    tracing::info!("Audio saved as {}", path.display());
    Ok(path.to_path_buf())
}

/// Write interleaved samples of any channel count as 16-bit stereo
pub fn write_stereo_wav(path: &Path, interleaved: &[f32], channels: usize, sample_rate: u32) -> SatbResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(rec_err)?;
    let to_i16 = |x: f32| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;

    for frame in interleaved.chunks(channels.max(1)) {
        let left = frame[0];
        let right = frame.get(1).copied().unwrap_or(left);
        writer.write_sample(to_i16(left)).map_err(rec_err)?;
        writer.write_sample(to_i16(right)).map_err(rec_err)?;
    }
    writer.finalize().map_err(rec_err)?;
    Ok(())
}
