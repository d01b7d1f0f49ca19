//! Transport seam between the poller and the server.
//!
//! The poller only needs "give me the current history snapshot"; this
//! trait keeps it independent of the concrete HTTP client so tests can
//! drive the loop with canned snapshots.

use async_trait::async_trait;
use promptwatch_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use promptwatch_comfyui::history::HistorySnapshot;

/// A source of history snapshots.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the current snapshot of all job records.
    async fn snapshot(&self) -> Result<HistorySnapshot, ComfyUIApiError>;
}

#[async_trait]
impl HistorySource for ComfyUIApi {
    async fn snapshot(&self) -> Result<HistorySnapshot, ComfyUIApiError> {
        self.history().await
    }
}
