use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{Result, RevoiceError};

use super::{MediaTool, CHANNELS, SAMPLE_RATE};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

async fn check_binary(binary: &Path) -> Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            RevoiceError::MediaTool(format!(
                "{} not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}",
                binary.display()
            ))
        })?;

    if !output.status.success() {
        return Err(RevoiceError::MediaTool(format!(
            "{} check failed",
            binary.display()
        )));
    }

    debug!("{} is available", binary.display());
    Ok(())
}

/// Last few lines of a tool's stderr, for diagnostics.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}

fn format_secs(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64())
}

/// [`MediaTool`] backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    /// Set once both binaries have been seen to work.
    checked: OnceCell<()>,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use specific binaries instead of whatever is on `PATH`.
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            checked: OnceCell::new(),
        }
    }

    /// Verify both binaries run.
    pub async fn check_binaries(&self) -> Result<()> {
        check_binary(&self.ffmpeg).await?;
        check_binary(&self.ffprobe).await
    }

    fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, step: &str) -> Result<Output> {
        debug!("Running {step}: {:?}", cmd.as_std());

        let output = cmd
            .output()
            .await
            .map_err(|e| RevoiceError::MediaTool(format!("Failed to run {step}: {e}")))?;

        if !output.status.success() {
            return Err(RevoiceError::MediaTool(format!(
                "{step} exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        Ok(output)
    }

    /// Resample to the pipeline's fixed PCM format.
    fn pcm_args(cmd: &mut Command) {
        cmd.args(["-acodec", "pcm_s16le", "-ar"])
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string());
    }

    fn build_extract_command(&self, video: &Path, output: &Path) -> Command {
        let mut cmd = self.ffmpeg_command();
        cmd.arg("-i").arg(video).arg("-vn");
        Self::pcm_args(&mut cmd);
        cmd.arg(output);
        cmd
    }

    fn build_trim_command(
        &self,
        audio: &Path,
        start: Duration,
        duration: Duration,
        output: &Path,
    ) -> Command {
        let mut cmd = self.ffmpeg_command();
        cmd.arg("-i")
            .arg(audio)
            .arg("-ss")
            .arg(format_secs(start))
            .arg("-t")
            .arg(format_secs(duration));
        Self::pcm_args(&mut cmd);
        cmd.arg(output);
        cmd
    }

    /// Join converted chunks in the format the inference tool wrote them in,
    /// so the result matches a single chunk copied verbatim.
    fn build_concat_command(&self, chunks: &[PathBuf], output: &Path) -> Command {
        let mut cmd = self.ffmpeg_command();
        let mut filter = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            cmd.arg("-i").arg(chunk);
            filter.push_str(&format!("[{i}:0]"));
        }
        filter.push_str(&format!("concat=n={}:v=0:a=1[out]", chunks.len()));

        cmd.arg("-filter_complex")
            .arg(filter)
            .args(["-map", "[out]", "-c:a", "pcm_s16le"])
            .arg(output);
        cmd
    }

    fn build_remux_command(&self, video: &Path, audio: &Path, output: &Path) -> Command {
        let mut cmd = self.ffmpeg_command();
        cmd.arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args([
                "-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0", "-shortest",
            ])
            .arg(output);
        cmd
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        if !video.exists() {
            return Err(RevoiceError::FileNotFound(video.display().to_string()));
        }

        info!("Extracting audio from {}", video.display());

        let cmd = self.build_extract_command(video, output);
        self.run(cmd, "audio extraction").await?;

        if !output.exists() {
            return Err(RevoiceError::MediaTool(
                "Audio extraction produced no output file".to_string(),
            ));
        }

        Ok(())
    }

    async fn probe_duration(&self, media: &Path) -> Result<Duration> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = self.run(cmd, "duration probe").await?;

        let duration_str = String::from_utf8_lossy(&output.stdout);
        parse_duration(duration_str.trim())
    }

    async fn trim(
        &self,
        audio: &Path,
        start: Duration,
        duration: Duration,
        output: &Path,
    ) -> Result<()> {
        if duration.is_zero() {
            return Err(RevoiceError::MediaTool(
                "Segment duration is zero".to_string(),
            ));
        }

        let cmd = self.build_trim_command(audio, start, duration, output);
        self.run(cmd, "audio trim").await?;
        Ok(())
    }

    async fn concat(&self, chunks: &[PathBuf], output: &Path) -> Result<()> {
        match chunks {
            [] => Err(RevoiceError::MediaTool(
                "Nothing to concatenate".to_string(),
            )),
            [single] => {
                debug!("Single chunk, copying {} verbatim", single.display());
                tokio::fs::copy(single, output).await.map_err(|e| {
                    RevoiceError::MediaTool(format!("Failed to copy {}: {e}", single.display()))
                })?;
                Ok(())
            }
            many => {
                let cmd = self.build_concat_command(many, output);
                self.run(cmd, "audio concat").await?;
                Ok(())
            }
        }
    }

    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let cmd = self.build_remux_command(video, audio, output);
        self.run(cmd, "remux").await?;
        Ok(())
    }

    /// Runs the binaries once; later calls reuse a successful result.
    async fn check(&self) -> Result<()> {
        self.checked
            .get_or_try_init(|| self.check_binaries())
            .await
            .map(|_| ())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Parse ffprobe's duration output. A track must have positive length.
fn parse_duration(s: &str) -> Result<Duration> {
    let secs: f64 = s.parse().map_err(|e| {
        RevoiceError::MediaTool(format!("Failed to parse duration '{s}': {e}"))
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(RevoiceError::MediaTool(format!(
            "No audio to convert (duration '{s}')"
        )));
    }

    Duration::try_from_secs_f64(secs)
        .map_err(|e| RevoiceError::MediaTool(format!("Unusable duration '{s}': {e}")))
}
