//! Fake media and inference tools shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use revoice::config::{InferenceConfig, VoiceTable};
use revoice::convert::VoiceConverter;
use revoice::media::{AudioChunk, MediaTool};
use revoice::{
    Pipeline, PipelineConfig, PipelineStats, Result, RevoiceError, VoiceCatalog, VoiceModel,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Stage at which [`FakeMedia`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Extract,
    Probe,
    Trim(usize),
    Concat,
    Remux,
}

/// Media tool writing small text files instead of running ffmpeg.
pub struct FakeMedia {
    pub duration: Duration,
    pub fail_at: Option<FailAt>,
    pub trims: Mutex<Vec<(Duration, Duration)>>,
    pub concat_inputs: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeMedia {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail_at: None,
            trims: Mutex::new(Vec::new()),
            concat_inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(duration: Duration, fail_at: FailAt) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(duration)
        }
    }

    fn maybe_fail(&self, at: FailAt) -> Result<()> {
        if self.fail_at == Some(at) {
            return Err(RevoiceError::MediaTool(format!("fake failure at {at:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        self.maybe_fail(FailAt::Extract)?;
        if !video.exists() {
            return Err(RevoiceError::FileNotFound(video.display().to_string()));
        }
        std::fs::write(output, b"audio")?;
        Ok(())
    }

    async fn probe_duration(&self, _media: &Path) -> Result<Duration> {
        self.maybe_fail(FailAt::Probe)?;
        Ok(self.duration)
    }

    async fn trim(
        &self,
        _audio: &Path,
        start: Duration,
        duration: Duration,
        output: &Path,
    ) -> Result<()> {
        let index = self.trims.lock().unwrap().len();
        self.maybe_fail(FailAt::Trim(index))?;
        self.trims.lock().unwrap().push((start, duration));
        std::fs::write(output, format!("[{}+{}]", start.as_secs(), duration.as_secs()))?;
        Ok(())
    }

    async fn concat(&self, chunks: &[PathBuf], output: &Path) -> Result<()> {
        self.concat_inputs.lock().unwrap().push(chunks.to_vec());
        self.maybe_fail(FailAt::Concat)?;
        let mut joined = Vec::new();
        for chunk in chunks {
            joined.extend(std::fs::read(chunk)?);
        }
        std::fs::write(output, joined)?;
        Ok(())
    }

    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.maybe_fail(FailAt::Remux)?;
        let mut muxed = std::fs::read(video)?;
        muxed.extend_from_slice(b"|");
        muxed.extend(std::fs::read(audio)?);
        std::fs::write(output, muxed)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake media"
    }
}

/// Converter wrapping each chunk's contents and recording what it saw.
pub struct FakeConverter {
    pub fail_on_index: Option<usize>,
    pub delay: Duration,
    /// Later chunks finish first when set.
    pub reverse_latency: bool,
    pub calls: Mutex<Vec<(usize, String)>>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self {
            fail_on_index: None,
            delay: Duration::ZERO,
            reverse_latency: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(index: usize) -> Self {
        Self {
            fail_on_index: Some(index),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn reversed() -> Self {
        Self {
            reverse_latency: true,
            ..Self::new()
        }
    }

    pub fn models_used(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|(i, _)| *i).collect()
    }
}

#[async_trait]
impl VoiceConverter for FakeConverter {
    async fn convert(&self, chunk: &AudioChunk, voice: &VoiceModel, output: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((chunk.index(), voice.model_name.clone()));

        let delay = if self.reverse_latency {
            Duration::from_millis(40u64.saturating_sub(chunk.index() as u64 * 10))
        } else {
            self.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_index == Some(chunk.index()) {
            return Err(RevoiceError::Inference(format!(
                "fake failure on chunk {}",
                chunk.index()
            )));
        }

        let source = std::fs::read_to_string(&chunk.path)?;
        std::fs::write(output, format!("v{source}"))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake converter"
    }
}

pub fn catalog() -> VoiceCatalog {
    let inference = InferenceConfig {
        rvc_dir: PathBuf::from("/app/rvc"),
        ..Default::default()
    };
    VoiceCatalog::new(&inference, &VoiceTable::default()).unwrap()
}

/// A pipeline over the fakes whose scratch areas live under `scratch_root`.
pub fn pipeline(
    media: Arc<FakeMedia>,
    converter: Arc<FakeConverter>,
    scratch_root: &TempDir,
    max_chunk: Duration,
    concurrency: usize,
) -> Pipeline {
    Pipeline::new(
        media,
        converter,
        catalog(),
        PipelineConfig {
            max_chunk_duration: max_chunk,
            concurrency,
            scratch_root: Some(scratch_root.path().to_path_buf()),
            show_progress: false,
        },
    )
}

/// Number of entries left under a scratch root.
pub fn residue(root: &TempDir) -> usize {
    std::fs::read_dir(root.path()).unwrap().count()
}

/// Upload `video` in one piece, convert it and read the output back.
pub async fn convert_bytes(
    pipeline: &Pipeline,
    video: &[u8],
    identity: Option<&str>,
) -> Result<(Vec<u8>, PipelineStats)> {
    let body = futures::stream::iter([Ok::<_, std::convert::Infallible>(video.to_vec())]);
    let staged = pipeline.stage_upload(body).await?;
    let converted = pipeline.process_upload(staged, identity).await?;
    let stats = converted.stats.clone();

    let (_, stream) = converted.into_stream().await?;
    let mut output = Vec::new();
    for piece in stream.collect::<Vec<_>>().await {
        output.extend_from_slice(&piece?);
    }
    Ok((output, stats))
}
