use crate::error::{Result, RevoiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Model and index file names for one voice, relative to the weights directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAssets {
    pub model: String,
    pub index: String,
}

/// The two voices the service ships with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceTable {
    pub female: VoiceAssets,
    pub male: VoiceAssets,
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self {
            female: VoiceAssets {
                model: "NikkiDorkDiaries.pth".to_string(),
                index: "added_IVF110_Flat_nprobe_1_NikkiDorkDiaries_v2.index".to_string(),
            },
            male: VoiceAssets {
                model: "AndyField_350e_5950s.pth".to_string(),
                index: "AndyField.index".to_string(),
            },
        }
    }
}

/// Where and how the RVC command-line tool runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Python interpreter used to launch the inference script.
    pub python: PathBuf,
    /// RVC checkout; the inference process runs with this as its working directory.
    pub rvc_dir: PathBuf,
    /// Inference script, relative to `rvc_dir` unless absolute.
    pub script: PathBuf,
    /// Model weights and index files, relative to `rvc_dir` unless absolute.
    pub weights_dir: PathBuf,
    pub device: String,
    pub half_precision: bool,
    /// HOME for the child process. RVC writes caches there.
    pub home: Option<PathBuf>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            rvc_dir: PathBuf::from("/app/rvc"),
            script: PathBuf::from("tools/infer_cli.py"),
            weights_dir: PathBuf::from("assets/weights"),
            device: "cuda:0".to_string(),
            half_precision: true,
            home: Some(PathBuf::from("/tmp")),
        }
    }
}

impl InferenceConfig {
    /// Absolute RVC directory.
    pub fn rvc_root(&self) -> Result<PathBuf> {
        std::path::absolute(&self.rvc_dir).map_err(|e| {
            RevoiceError::Config(format!(
                "Cannot resolve RVC directory {}: {e}",
                self.rvc_dir.display()
            ))
        })
    }

    /// Resolve a path that may be relative to the RVC directory.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.rvc_root()?.join(path))
        }
    }

    pub fn script_path(&self) -> Result<PathBuf> {
        self.resolve(&self.script)
    }

    pub fn weights_path(&self) -> Result<PathBuf> {
        self.resolve(&self.weights_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP service listens on.
    pub bind: String,
    /// Longest audio span handed to a single inference run, in seconds.
    pub max_chunk_secs: f64,
    /// Chunks converted at once within one request.
    pub concurrency: usize,
    /// Parent directory for request scratch areas (system temp dir when unset).
    pub scratch_dir: Option<PathBuf>,
    /// Abandon a request after this many seconds.
    pub request_timeout_secs: Option<u64>,
    pub max_upload_bytes: usize,
    pub inference: InferenceConfig,
    pub voices: VoiceTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_chunk_secs: 180.0,
            concurrency: 1,
            scratch_dir: None,
            request_timeout_secs: None,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
            inference: InferenceConfig::default(),
            voices: VoiceTable::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the user config file when `path` is `None`,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RevoiceError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| RevoiceError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("REVOICE_BIND") {
            self.bind = bind;
        }
        if let Ok(dir) = std::env::var("REVOICE_RVC_DIR") {
            self.inference.rvc_dir = PathBuf::from(dir);
        }
        if let Ok(python) = std::env::var("REVOICE_PYTHON") {
            self.inference.python = PathBuf::from(python);
        }
        if let Ok(device) = std::env::var("REVOICE_DEVICE") {
            self.inference.device = device;
        }
        if let Ok(dir) = std::env::var("REVOICE_SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Ok(concurrency) = std::env::var("REVOICE_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(secs) = std::env::var("REVOICE_MAX_CHUNK_SECS") {
            if let Ok(s) = secs.parse() {
                self.max_chunk_secs = s;
            }
        }
        if let Ok(secs) = std::env::var("REVOICE_REQUEST_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.request_timeout_secs = Some(s);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RevoiceError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if !self.max_chunk_secs.is_finite() || self.max_chunk_secs <= 0.0 {
            return Err(RevoiceError::Config(format!(
                "max_chunk_secs must be a positive number, got {}",
                self.max_chunk_secs
            )));
        }
        self.max_chunk_duration()?;

        if self.max_upload_bytes == 0 {
            return Err(RevoiceError::Config(
                "max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(RevoiceError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn max_chunk_duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.max_chunk_secs).map_err(|e| {
            RevoiceError::Config(format!(
                "max_chunk_secs {} is out of range: {e}",
                self.max_chunk_secs
            ))
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revoice").join("config.toml"))
    }
}
