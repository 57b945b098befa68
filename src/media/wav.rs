use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RevoiceError};

use super::{CHANNELS, SAMPLE_RATE};

/// Duration of a WAV file, read from its header.
pub fn wav_duration(path: &Path) -> Result<Duration> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        RevoiceError::MediaTool(format!("Cannot read WAV {}: {e}", path.display()))
    })?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(RevoiceError::MediaTool(format!(
            "WAV {} has a zero sample rate",
            path.display()
        )));
    }

    // `duration()` counts frames, not samples.
    let frames = reader.duration() as f64;
    Ok(Duration::from_secs_f64(frames / spec.sample_rate as f64))
}

/// Write `duration` of silent 16-bit stereo PCM in the pipeline's format.
pub fn write_silence(path: &Path, duration: Duration) -> Result<()> {
    write_silence_as(path, duration, SAMPLE_RATE, CHANNELS)
}

/// Write `duration` of silent 16-bit PCM at any rate and channel count.
pub fn write_silence_as(
    path: &Path,
    duration: Duration,
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let to_err =
        |e: hound::Error| RevoiceError::MediaTool(format!("Cannot write {}: {e}", path.display()));

    let mut writer = hound::WavWriter::create(path, spec).map_err(to_err)?;
    let frames = (duration.as_secs_f64() * sample_rate as f64).round() as u64;
    for _ in 0..frames * channels as u64 {
        writer.write_sample(0i16).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)
}
