use crate::config::Config;
use crate::convert::{ConversionOrchestrator, RvcConverter, VoiceConverter};
use crate::error::{Result, RevoiceError};
use crate::media::{create_chunks, plan_chunks, Ffmpeg, MediaTool};
use crate::scratch::ScratchArea;
use crate::voice::{Voice, VoiceCatalog};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

/// Name of the uploaded video inside the scratch area.
const UPLOAD_NAME: &str = "input.mp4";

/// Settings for one pipeline instance, shared by every request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Longest span handed to one inference run.
    pub max_chunk_duration: Duration,
    /// Chunks converted at once within one request.
    pub concurrency: usize,
    /// Parent directory for scratch areas.
    pub scratch_root: Option<PathBuf>,
    /// Show progress bars.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_duration: Duration::from_secs(180),
            concurrency: 1,
            scratch_root: None,
            show_progress: false,
        }
    }
}

impl TryFrom<&Config> for PipelineConfig {
    type Error = RevoiceError;

    fn try_from(config: &Config) -> Result<Self> {
        Ok(Self {
            max_chunk_duration: config.max_chunk_duration()?,
            concurrency: config.concurrency,
            scratch_root: config.scratch_dir.clone(),
            show_progress: false,
        })
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ExtractAudio,
    ProbeDuration,
    PlanChunks,
    ConvertChunks,
    Concat,
    Remux,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ExtractAudio => "extract audio",
            Stage::ProbeDuration => "probe duration",
            Stage::PlanChunks => "plan chunks",
            Stage::ConvertChunks => "convert chunks",
            Stage::Concat => "concat",
            Stage::Remux => "remux",
        };
        f.write_str(name)
    }
}

/// Statistics from one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub conversion_time: Duration,
    pub chunks_converted: usize,
    pub audio_duration: Duration,
    pub voice: Voice,
    /// Largest measured length difference between a converted chunk and its source.
    pub max_drift: Option<Duration>,
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// The remuxed video.
    pub output_path: PathBuf,
    pub stats: PipelineStats,
}

/// An uploaded video written into its own scratch area.
#[derive(Debug)]
pub struct StagedVideo {
    scratch: ScratchArea,
    path: PathBuf,
    size: u64,
}

impl StagedVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes received.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A converted video still inside its request's scratch area.
///
/// The scratch area is removed when this value, or the stream made from it,
/// is dropped.
#[derive(Debug)]
pub struct ConvertedVideo {
    scratch: ScratchArea,
    path: PathBuf,
    pub stats: PipelineStats,
}

impl ConvertedVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the video for streaming.
    ///
    /// Returns its length and a stream of its contents. The stream owns the
    /// scratch area, so the file outlives the read.
    pub async fn into_stream(
        self,
    ) -> Result<(u64, impl Stream<Item = std::io::Result<Bytes>> + Send + 'static)> {
        let file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        let scratch = self.scratch;
        let stream = ReaderStream::new(file).map(move |chunk| {
            let _held = &scratch;
            chunk
        });

        Ok((len, stream))
    }
}

/// The chunked voice-conversion pipeline.
///
/// Holds only immutable, process-wide state; any number of requests may run
/// through one instance at once.
pub struct Pipeline {
    media: Arc<dyn MediaTool>,
    converter: Arc<dyn VoiceConverter>,
    catalog: VoiceCatalog,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        media: Arc<dyn MediaTool>,
        converter: Arc<dyn VoiceConverter>,
        catalog: VoiceCatalog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            media,
            converter,
            catalog,
            config,
        }
    }

    /// Build the production pipeline: ffmpeg for media, RVC for inference.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let catalog = VoiceCatalog::new(&config.inference, &config.voices)?;
        let converter = RvcConverter::new(&config.inference)?;

        Ok(Self::new(
            Arc::new(Ffmpeg::new()),
            Arc::new(converter),
            catalog,
            PipelineConfig::try_from(config)?,
        ))
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Write an upload body into a fresh scratch area, one piece at a time.
    pub async fn stage_upload<S, T, E>(&self, body: S) -> Result<StagedVideo>
    where
        S: Stream<Item = std::result::Result<T, E>>,
        T: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let scratch = ScratchArea::create(self.config.scratch_root.as_deref())?;
        let path = scratch.file(UPLOAD_NAME);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut size = 0u64;

        let mut body = std::pin::pin!(body);
        while let Some(piece) = body.next().await {
            let piece = piece
                .map_err(|e| RevoiceError::Upload(format!("Unreadable video upload: {e}")))?;
            let piece = piece.as_ref();
            file.write_all(piece).await?;
            size += piece.len() as u64;
        }
        file.flush().await?;

        if size == 0 {
            return Err(RevoiceError::Upload("Uploaded video is empty".to_string()));
        }
        debug!("Staged {} byte upload at {}", size, path.display());

        Ok(StagedVideo {
            scratch,
            path,
            size,
        })
    }

    /// Convert a staged upload. The output stays in the upload's scratch area.
    pub async fn process_upload(
        &self,
        upload: StagedVideo,
        identity: Option<&str>,
    ) -> Result<ConvertedVideo> {
        let StagedVideo { scratch, path, .. } = upload;
        let output = scratch.file("output.mp4");
        let result = self.run(&path, &output, identity, &scratch).await?;

        Ok(ConvertedVideo {
            scratch,
            path: result.output_path,
            stats: result.stats,
        })
    }

    /// Convert a video on disk, writing the result to `output`.
    pub async fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        identity: Option<&str>,
    ) -> Result<PipelineResult> {
        if !input.exists() {
            return Err(RevoiceError::FileNotFound(input.display().to_string()));
        }

        let scratch = ScratchArea::create(self.config.scratch_root.as_deref())?;

        // ffmpeg picks the container from the extension.
        let ext = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let staged = scratch.file(&format!("output.{ext}"));
        let mut result = self.run(input, &staged, identity, &scratch).await?;
        tokio::fs::copy(&staged, output).await?;

        result.output_path = output.to_path_buf();
        scratch.close();
        Ok(result)
    }

    /// Run every stage for `video`, writing intermediates into `scratch` and
    /// the remuxed video to `output`.
    ///
    /// Stops at the first failing stage; nothing after it runs.
    pub async fn run(
        &self,
        video: &Path,
        output: &Path,
        identity: Option<&str>,
        scratch: &ScratchArea,
    ) -> Result<PipelineResult> {
        let mut stage = Stage::Start;
        let result = self
            .run_stages(video, output, identity, scratch, &mut stage)
            .await;

        match &result {
            Ok(r) => info!(
                "Pipeline completed: {} chunks, {:.1}s audio in {:.2}s",
                r.stats.chunks_converted,
                r.stats.audio_duration.as_secs_f64(),
                r.stats.total_time.as_secs_f64()
            ),
            Err(e) => error!("Pipeline failed during {}: {}", stage, e),
        }

        result
    }

    async fn run_stages(
        &self,
        video: &Path,
        output: &Path,
        identity: Option<&str>,
        scratch: &ScratchArea,
        stage: &mut Stage,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let voice = self.catalog.lookup(identity);
        debug!(
            "Voice identity {:?} resolved to {} ({})",
            identity, voice.voice, voice.model_name
        );

        self.media.check().await?;
        debug!("Media tool: {}", self.media.name());

        // ═══════════════════════════════════════════════════════════════════
        // Stage 1: Audio extraction
        // ═══════════════════════════════════════════════════════════════════
        *stage = Stage::ExtractAudio;
        info!("Stage 1/5: Extracting audio from {}", video.display());
        let extraction_start = Instant::now();

        let audio_path = scratch.file("audio.wav");
        self.media.extract_audio(video, &audio_path).await?;

        *stage = Stage::ProbeDuration;
        let audio_duration = self.media.probe_duration(&audio_path).await?;
        let extraction_time = extraction_start.elapsed();
        info!(
            "Audio extraction complete: {:.1}s duration in {:.2}s",
            audio_duration.as_secs_f64(),
            extraction_time.as_secs_f64()
        );

        // ═══════════════════════════════════════════════════════════════════
        // Stage 2: Chunking
        // ═══════════════════════════════════════════════════════════════════
        *stage = Stage::PlanChunks;
        let spans = plan_chunks(audio_duration, self.config.max_chunk_duration);
        if spans.is_empty() {
            return Err(RevoiceError::MediaTool(
                "Audio track is empty".to_string(),
            ));
        }
        info!(
            "Stage 2/5: Splitting {:.1}s of audio into {} chunks of at most {:.0}s",
            audio_duration.as_secs_f64(),
            spans.len(),
            self.config.max_chunk_duration.as_secs_f64()
        );

        let chunks_dir = scratch.subdir("chunks")?;
        let chunks = create_chunks(self.media.as_ref(), &audio_path, &spans, &chunks_dir).await?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 3: Voice conversion
        // ═══════════════════════════════════════════════════════════════════
        *stage = Stage::ConvertChunks;
        info!("Stage 3/5: Converting voice to {}", voice.voice);

        let converted_dir = scratch.subdir("converted")?;
        let orchestrator =
            ConversionOrchestrator::new(self.converter.clone(), self.config.concurrency)
                .with_progress(self.config.show_progress);
        let (converted, conversion_stats) = orchestrator
            .convert_chunks(&chunks, voice, &converted_dir)
            .await?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 4: Reassembly
        // ═══════════════════════════════════════════════════════════════════
        *stage = Stage::Concat;
        let ordered: Vec<PathBuf> = converted.iter().map(|c| c.path.clone()).collect();
        if ordered.len() == 1 {
            info!("Stage 4/5: Single chunk, copying converted audio");
        } else {
            info!("Stage 4/5: Joining {} converted chunks", ordered.len());
        }

        let final_audio = scratch.file("final_audio.wav");
        self.media.concat(&ordered, &final_audio).await?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 5: Remux
        // ═══════════════════════════════════════════════════════════════════
        *stage = Stage::Remux;
        info!("Stage 5/5: Muxing converted audio with original video");

        self.media.remux(video, &final_audio, output).await?;

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            extraction_time,
            conversion_time: conversion_stats.total_time,
            chunks_converted: conversion_stats.total_chunks,
            audio_duration,
            voice: voice.voice,
            max_drift: conversion_stats.max_drift,
        };

        Ok(PipelineResult {
            output_path: output.to_path_buf(),
            stats,
        })
    }
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Voice Conversion Complete                 ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Voice:      {}", result.stats.voice);
    println!(
        "  Duration:   {:.1}s audio",
        result.stats.audio_duration.as_secs_f64()
    );
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Convert:     {:.2}s ({} chunks)",
        result.stats.conversion_time.as_secs_f64(),
        result.stats.chunks_converted
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    if let Some(drift) = result.stats.max_drift {
        println!();
        println!("  Max chunk drift: {:.1}ms", drift.as_secs_f64() * 1000.0);
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
