//! Voice identities and the model assets behind them.
//!
//! Identity resolution is fail-open: `"female"` in any letter case selects the
//! female voice, and every other value (including an empty or missing one)
//! selects the default male voice. Unknown identities are not rejected.

use crate::config::{InferenceConfig, VoiceAssets, VoiceTable};
use crate::error::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Voice {
    Female,
    #[default]
    Male,
}

impl Voice {
    /// Map a client-supplied identity to a voice.
    pub fn resolve(identity: Option<&str>) -> Self {
        match identity {
            Some(s) if s.trim().eq_ignore_ascii_case("female") => Voice::Female,
            _ => Voice::Male,
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Voice::Female => write!(f, "female"),
            Voice::Male => write!(f, "male"),
        }
    }
}

/// A voice's model name and absolute index path, ready for inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceModel {
    pub voice: Voice,
    /// Model file name, looked up by the inference tool in its weights directory.
    pub model_name: String,
    pub index_path: PathBuf,
}

/// Immutable voice → assets mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    female: VoiceModel,
    male: VoiceModel,
}

impl VoiceCatalog {
    pub fn new(inference: &InferenceConfig, table: &VoiceTable) -> Result<Self> {
        let weights = inference.weights_path()?;
        let model = |voice: Voice, assets: &VoiceAssets| VoiceModel {
            voice,
            model_name: assets.model.clone(),
            index_path: weights.join(&assets.index),
        };

        Ok(Self {
            female: model(Voice::Female, &table.female),
            male: model(Voice::Male, &table.male),
        })
    }

    pub fn get(&self, voice: Voice) -> &VoiceModel {
        match voice {
            Voice::Female => &self.female,
            Voice::Male => &self.male,
        }
    }

    /// Resolve a raw identity straight to its assets.
    pub fn lookup(&self, identity: Option<&str>) -> &VoiceModel {
        self.get(Voice::resolve(identity))
    }
}
