use crate::convert::VoiceConverter;
use crate::error::{Result, RevoiceError};
use crate::media::{wav_duration, AudioChunk, ConvertedChunk};
use crate::voice::VoiceModel;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Converted chunks drifting more than this from their source are reported.
const DRIFT_WARN_THRESHOLD: Duration = Duration::from_millis(50);

/// Statistics from the conversion stage.
#[derive(Debug, Clone)]
pub struct ConversionStats {
    pub total_chunks: usize,
    pub total_time: Duration,
    pub avg_chunk_time: Duration,
    /// Largest measured difference between a converted chunk and its source.
    pub max_drift: Option<Duration>,
}

/// Result of converting a single chunk.
#[derive(Debug)]
struct ChunkResult {
    converted: ConvertedChunk,
    elapsed: Duration,
    drift: Option<Duration>,
}

/// Drives the voice converter over every chunk of a request.
///
/// Chunks run at most `concurrency` at a time and are returned in index order
/// regardless of completion order. The first failure aborts the remaining work.
pub struct ConversionOrchestrator {
    converter: Arc<dyn VoiceConverter>,
    concurrency: usize,
    show_progress: bool,
}

impl ConversionOrchestrator {
    pub fn new(converter: Arc<dyn VoiceConverter>, concurrency: usize) -> Self {
        Self {
            converter,
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn convert_chunks(
        &self,
        chunks: &[AudioChunk],
        voice: &VoiceModel,
        output_dir: &Path,
    ) -> Result<(Vec<ConvertedChunk>, ConversionStats)> {
        let total_chunks = chunks.len();
        let start_time = Instant::now();

        info!(
            "Converting {} chunks with {} (voice: {}, concurrency: {})",
            total_chunks,
            self.converter.name(),
            voice.voice,
            self.concurrency
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_chunks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        // Fair semaphore: with concurrency 1 chunks run strictly in index order.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for chunk in chunks {
            let sem = semaphore.clone();
            let converter = self.converter.clone();
            let pb = progress_bar.clone();
            let output = output_dir.join(format!("converted_{:04}.wav", chunk.index()));

            futures.push(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| RevoiceError::Internal(format!("Semaphore closed: {e}")))?;

                let chunk_start = Instant::now();
                debug!(
                    "Starting conversion of chunk {}/{}",
                    chunk.index() + 1,
                    total_chunks
                );

                converter.convert(chunk, voice, &output).await.map_err(|e| {
                    warn!("Chunk {} failed: {}", chunk.index(), e);
                    e
                })?;

                let elapsed = chunk_start.elapsed();
                let converted = ConvertedChunk {
                    index: chunk.index(),
                    path: output,
                    source_duration: chunk.duration(),
                };
                let drift = measure_drift(&converted);
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                debug!("Chunk {} converted in {:?}", chunk.index(), elapsed);

                Ok::<_, RevoiceError>(ChunkResult {
                    converted,
                    elapsed,
                    drift,
                })
            });
        }

        let mut results: Vec<ChunkResult> = Vec::with_capacity(total_chunks);
        while let Some(result) = futures.next().await {
            match result {
                Ok(r) => results.push(r),
                Err(e) => {
                    if let Some(pb) = progress_bar {
                        pb.abandon_with_message("Conversion failed");
                    }
                    // Dropping the remaining futures kills their child processes.
                    return Err(e);
                }
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Conversion complete");
        }

        results.sort_by_key(|r| r.converted.index);

        let total_time = start_time.elapsed();
        let chunk_time: Duration = results.iter().map(|r| r.elapsed).sum();
        let avg_chunk_time = if results.is_empty() {
            Duration::ZERO
        } else {
            chunk_time / results.len() as u32
        };
        let max_drift = results.iter().filter_map(|r| r.drift).max();

        info!(
            "Conversion complete: {} chunks in {:.2}s (avg {:.2}s/chunk)",
            total_chunks,
            total_time.as_secs_f64(),
            avg_chunk_time.as_secs_f64()
        );

        let stats = ConversionStats {
            total_chunks,
            total_time,
            avg_chunk_time,
            max_drift,
        };

        Ok((results.into_iter().map(|r| r.converted).collect(), stats))
    }
}

/// Difference between a converted chunk's length and its source's.
///
/// Only measured for readable WAV output; drift is reported, not corrected.
fn measure_drift(converted: &ConvertedChunk) -> Option<Duration> {
    match wav_duration(&converted.path) {
        Ok(actual) => {
            let drift = actual.abs_diff(converted.source_duration);
            if drift > DRIFT_WARN_THRESHOLD {
                warn!(
                    "Converted chunk {} is {:?} long, source was {:?}",
                    converted.index, actual, converted.source_duration
                );
            }
            Some(drift)
        }
        Err(e) => {
            debug!("Skipping drift check: {}", e);
            None
        }
    }
}
