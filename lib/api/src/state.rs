//! Shared state handed to every handler.

use meridian_execution::ports::{EventBus, RunStore};
use meridian_queue::WorkQueue;
use std::sync::Arc;

/// Submission API tuning knobs, read from process configuration at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Maximum accepted size of the `payload` field, in bytes.
    pub max_payload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { max_payload_bytes: 256 * 1024 }
    }
}

/// Shared dependencies for the submission API's router.
pub struct AppState {
    pub run_store: Arc<dyn RunStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub events: Arc<dyn EventBus>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(
        run_store: Arc<dyn RunStore>,
        queue: Arc<dyn WorkQueue>,
        events: Arc<dyn EventBus>,
        config: ApiConfig,
    ) -> Self {
        Self { run_store, queue, events, config }
    }
}
