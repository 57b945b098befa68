use thiserror::Error;

#[derive(Error, Debug)]
pub enum RevoiceError {
    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Media tool failed: {0}")]
    MediaTool(String),

    #[error("Voice conversion failed: {0}")]
    Inference(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RevoiceError {
    /// Message safe to hand back to a remote caller.
    ///
    /// Tool diagnostics and filesystem paths stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RevoiceError::Upload(msg) => msg.clone(),
            RevoiceError::MediaTool(_) | RevoiceError::FileNotFound(_) => {
                "Media processing failed".to_string()
            }
            RevoiceError::Inference(_) => "Voice conversion failed".to_string(),
            RevoiceError::Timeout(_) => "Request timed out".to_string(),
            RevoiceError::Config(_)
            | RevoiceError::Internal(_)
            | RevoiceError::Io(_) => "Internal server error".to_string(),
        }
    }

    /// True when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RevoiceError::Upload(_))
    }
}

pub type Result<T> = std::result::Result<T, RevoiceError>;
