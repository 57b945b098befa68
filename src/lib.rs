pub mod config;
pub mod convert;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod scratch;
pub mod server;
pub mod voice;

pub use config::Config;
pub use error::{Result, RevoiceError};
pub use pipeline::{print_summary, Pipeline, PipelineConfig, PipelineResult, PipelineStats};
pub use voice::{Voice, VoiceCatalog, VoiceModel};
