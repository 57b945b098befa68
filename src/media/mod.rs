pub mod chunk;
pub mod ffmpeg;
pub mod wav;

pub use chunk::{create_chunks, estimate_wav_size, plan_chunks};
pub use ffmpeg::Ffmpeg;
pub use wav::wav_duration;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sample rate of every intermediate PCM file.
pub const SAMPLE_RATE: u32 = 44_100;

/// Channel count of every intermediate PCM file.
pub const CHANNELS: u16 = 2;

/// A planned time range of the extracted audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: Duration,
    pub duration: Duration,
}

impl ChunkSpan {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// A chunk materialized on disk, ready for conversion.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub span: ChunkSpan,
    pub path: PathBuf,
}

impl AudioChunk {
    pub fn index(&self) -> usize {
        self.span.index
    }

    pub fn duration(&self) -> Duration {
        self.span.duration
    }
}

/// Output of the inference tool for one chunk.
#[derive(Debug, Clone)]
pub struct ConvertedChunk {
    pub index: usize,
    pub path: PathBuf,
    /// Duration of the source chunk.
    pub source_duration: Duration,
}

/// External audio/video tooling used by the pipeline.
///
/// Every operation reads its inputs and writes a new file at `output`;
/// nothing is edited in place.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Demux the audio of `video` into 44.1kHz 16-bit stereo PCM.
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()>;

    /// Total duration of a media file.
    async fn probe_duration(&self, media: &Path) -> Result<Duration>;

    /// Copy `duration` of audio starting at `start` into a new PCM file.
    async fn trim(
        &self,
        audio: &Path,
        start: Duration,
        duration: Duration,
        output: &Path,
    ) -> Result<()>;

    /// Join `chunks` in order. A single chunk is copied verbatim.
    async fn concat(&self, chunks: &[PathBuf], output: &Path) -> Result<()>;

    /// Combine the video stream of `video` with the audio of `audio`,
    /// truncated to the shorter of the two.
    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// Verify the underlying tools are usable before a run.
    async fn check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
