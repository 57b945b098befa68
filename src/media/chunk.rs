use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, RevoiceError};

use super::{AudioChunk, ChunkSpan, MediaTool, CHANNELS, SAMPLE_RATE};

/// Split `total_duration` into contiguous spans of at most `max_duration`.
///
/// Spans start at zero, never overlap, and their durations sum to exactly
/// `total_duration`. Only the last span can be shorter than `max_duration`.
/// A zero total yields no spans; a zero `max_duration` yields a single span.
pub fn plan_chunks(total_duration: Duration, max_duration: Duration) -> Vec<ChunkSpan> {
    if total_duration.is_zero() {
        return Vec::new();
    }

    if max_duration.is_zero() || total_duration <= max_duration {
        return vec![ChunkSpan {
            index: 0,
            start: Duration::ZERO,
            duration: total_duration,
        }];
    }

    let count = total_duration.as_nanos().div_ceil(max_duration.as_nanos()) as usize;
    let mut chunks = Vec::with_capacity(count);
    let mut start = Duration::ZERO;

    for index in 0..count {
        let duration = max_duration.min(total_duration - start);
        chunks.push(ChunkSpan {
            index,
            start,
            duration,
        });
        start += duration;
    }

    chunks
}

/// Materialize each planned span as its own PCM file in `output_dir`.
pub async fn create_chunks(
    media: &dyn MediaTool,
    source_audio: &Path,
    spans: &[ChunkSpan],
    output_dir: &Path,
) -> Result<Vec<AudioChunk>> {
    if !source_audio.exists() {
        return Err(RevoiceError::FileNotFound(
            source_audio.display().to_string(),
        ));
    }

    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        RevoiceError::MediaTool(format!("Failed to create chunk directory: {e}"))
    })?;

    info!(
        "Creating {} audio chunks in {}",
        spans.len(),
        output_dir.display()
    );

    let mut chunks = Vec::with_capacity(spans.len());

    for span in spans {
        let chunk_path = output_dir.join(format!("chunk_{:04}.wav", span.index));

        debug!(
            "Creating chunk {}: {:?} + {:?} (~{} bytes)",
            span.index,
            span.start,
            span.duration,
            estimate_wav_size(span.duration)
        );

        media
            .trim(source_audio, span.start, span.duration, &chunk_path)
            .await?;

        chunks.push(AudioChunk {
            span: *span,
            path: chunk_path,
        });
    }

    Ok(chunks)
}

/// Estimate file size for a WAV chunk (16-bit stereo 44.1kHz).
pub fn estimate_wav_size(duration: Duration) -> usize {
    const BYTES_PER_SAMPLE: usize = 2;
    const WAV_HEADER_SIZE: usize = 44;

    let samples = (duration.as_secs_f64() * SAMPLE_RATE as f64) as usize;
    WAV_HEADER_SIZE + (samples * BYTES_PER_SAMPLE * CHANNELS as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn assert_covers(chunks: &[ChunkSpan], total: Duration, max: Duration) {
        assert_eq!(chunks[0].start, Duration::ZERO);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.duration > Duration::ZERO);
            assert!(chunk.duration <= max);
            assert!(chunk.end() <= total);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
        let sum: Duration = chunks.iter().map(|c| c.duration).sum();
        assert_eq!(sum, total);
    }

    #[test]
    fn test_plan_400_seconds() {
        let chunks = plan_chunks(secs(400), secs(180));

        assert_eq!(chunks.len(), 3);
        let starts: Vec<_> = chunks.iter().map(|c| c.start).collect();
        let durations: Vec<_> = chunks.iter().map(|c| c.duration).collect();
        assert_eq!(starts, vec![secs(0), secs(180), secs(360)]);
        assert_eq!(durations, vec![secs(180), secs(180), secs(40)]);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let chunks = plan_chunks(secs(360), secs(180));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].duration, secs(180));
    }

    #[test]
    fn test_plan_short_track_is_one_chunk() {
        let total = Duration::from_millis(250);
        let chunks = plan_chunks(total, secs(180));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, Duration::ZERO);
        assert_eq!(chunks[0].duration, total);
    }

    #[test]
    fn test_plan_equal_to_max_is_one_chunk() {
        let chunks = plan_chunks(secs(180), secs(180));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_plan_fractional_durations() {
        let total = Duration::from_secs_f64(1234.567891);
        let max = Duration::from_secs_f64(7.25);
        let chunks = plan_chunks(total, max);

        let expected = (total.as_secs_f64() / max.as_secs_f64()).ceil() as usize;
        assert_eq!(chunks.len(), expected);
        assert_covers(&chunks, total, max);
    }

    #[test]
    fn test_plan_coverage_grid() {
        for total_ms in [1, 999, 1000, 1001, 179_999, 180_000, 180_001, 3_600_000] {
            for max_ms in [250, 1000, 180_000] {
                let total = Duration::from_millis(total_ms);
                let max = Duration::from_millis(max_ms);
                let chunks = plan_chunks(total, max);

                assert_eq!(chunks.len() as u64, total_ms.div_ceil(max_ms));
                assert_covers(&chunks, total, max);
            }
        }
    }

    #[test]
    fn test_plan_zero_total() {
        assert!(plan_chunks(Duration::ZERO, secs(180)).is_empty());
    }

    #[test]
    fn test_estimate_wav_size() {
        let size = estimate_wav_size(secs(60));
        assert_eq!(size, 44 + (60 * 44_100 * 2 * 2));
    }
}
