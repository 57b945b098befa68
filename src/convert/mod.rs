pub mod orchestrator;
pub mod rvc;

pub use orchestrator::{ConversionOrchestrator, ConversionStats};
pub use rvc::{InferenceProfile, RvcConverter};

use crate::error::Result;
use crate::media::AudioChunk;
use crate::voice::VoiceModel;
use async_trait::async_trait;
use std::path::Path;

/// Converts the voice in one chunk of audio.
///
/// Implementations must not depend on shared mutable state: the orchestrator
/// may run several conversions at once.
#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// Convert `chunk` with `voice`, writing the result to `output`.
    async fn convert(&self, chunk: &AudioChunk, voice: &VoiceModel, output: &Path) -> Result<()>;

    fn name(&self) -> &'static str;
}
