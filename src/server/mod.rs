//! HTTP surface: a health probe and a single synchronous conversion endpoint.

pub mod handlers;
pub mod routes;

pub use routes::create_router;

use crate::config::Config;
use crate::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;

/// Shared, read-only state for all requests.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub request_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            request_timeout: config.request_timeout(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}
