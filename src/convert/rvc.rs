use crate::config::InferenceConfig;
use crate::convert::VoiceConverter;
use crate::error::{Result, RevoiceError};
use crate::media::ffmpeg::stderr_tail;
use crate::media::AudioChunk;
use crate::voice::{Voice, VoiceCatalog, VoiceModel};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Fixed tuning of the voice-conversion model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceProfile {
    pub f0_method: &'static str,
    pub f0_up_key: i32,
    pub index_rate: f32,
    pub filter_radius: u32,
    pub resample_sr: u32,
    pub rms_mix_rate: f32,
    pub protect: f32,
}

impl Default for InferenceProfile {
    fn default() -> Self {
        Self {
            f0_method: "harvest",
            f0_up_key: 0,
            index_rate: 0.7,
            filter_radius: 3,
            resample_sr: 0,
            rms_mix_rate: 0.25,
            protect: 0.33,
        }
    }
}

/// Runs the RVC command-line inference script once per chunk.
///
/// All paths handed to the script are absolute. The working directory is set
/// on each child process, never on this process.
#[derive(Debug, Clone)]
pub struct RvcConverter {
    python: PathBuf,
    script: PathBuf,
    rvc_dir: PathBuf,
    weights_dir: PathBuf,
    device: String,
    half_precision: bool,
    home: Option<PathBuf>,
    profile: InferenceProfile,
}

impl RvcConverter {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            python: config.python.clone(),
            script: config.script_path()?,
            rvc_dir: config.rvc_root()?,
            weights_dir: config.weights_path()?,
            device: config.device.clone(),
            half_precision: config.half_precision,
            home: config.home.clone(),
            profile: InferenceProfile::default(),
        })
    }

    /// Verify the script and every voice's assets are on disk.
    pub fn check_assets(&self, catalog: &VoiceCatalog) -> Result<()> {
        let mut missing = Vec::new();

        if !self.script.exists() {
            missing.push(self.script.clone());
        }
        for voice in [Voice::Female, Voice::Male] {
            let model = catalog.get(voice);
            let weights = self.weights_dir.join(&model.model_name);
            if !weights.exists() {
                missing.push(weights);
            }
            if !model.index_path.exists() {
                missing.push(model.index_path.clone());
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        let list: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        Err(RevoiceError::Config(format!(
            "Missing inference assets: {}",
            list.join(", ")
        )))
    }

    fn build_command(&self, input: &Path, voice: &VoiceModel, output: &Path) -> Command {
        let p = &self.profile;
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg("--input_path")
            .arg(input)
            .arg("--index_path")
            .arg(&voice.index_path)
            .args(["--f0method", p.f0_method])
            .arg("--opt_path")
            .arg(output)
            .args(["--model_name", voice.model_name.as_str()])
            .arg("--index_rate")
            .arg(p.index_rate.to_string())
            .args(["--device", self.device.as_str()])
            .args(["--is_half", if self.half_precision { "True" } else { "False" }])
            .arg("--filter_radius")
            .arg(p.filter_radius.to_string())
            .arg("--resample_sr")
            .arg(p.resample_sr.to_string())
            .arg("--rms_mix_rate")
            .arg(p.rms_mix_rate.to_string())
            .arg("--protect")
            .arg(p.protect.to_string())
            .arg("--f0up_key")
            .arg(p.f0_up_key.to_string())
            .current_dir(&self.rvc_dir)
            .env("weight_root", &self.weights_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref home) = self.home {
            cmd.env("HOME", home);
        }

        cmd
    }
}

#[async_trait]
impl VoiceConverter for RvcConverter {
    async fn convert(&self, chunk: &AudioChunk, voice: &VoiceModel, output: &Path) -> Result<()> {
        let input = std::path::absolute(&chunk.path)?;
        let output = std::path::absolute(output)?;
        let mut cmd = self.build_command(&input, voice, &output);

        debug!(
            "Converting chunk {} with {} ({})",
            chunk.index(),
            voice.model_name,
            voice.voice
        );

        let result = cmd.output().await.map_err(|e| {
            RevoiceError::Inference(format!(
                "Failed to start {}: {e}",
                self.python.display()
            ))
        })?;

        if !result.status.success() {
            return Err(RevoiceError::Inference(format!(
                "chunk {} exited with {}: {}",
                chunk.index(),
                result.status,
                stderr_tail(&result.stderr)
            )));
        }

        if !output.exists() {
            return Err(RevoiceError::Inference(format!(
                "chunk {} produced no output file",
                chunk.index()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "RVC"
    }
}
