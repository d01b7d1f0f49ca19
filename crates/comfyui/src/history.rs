//! History record types returned by the ComfyUI `/history` endpoints.
//!
//! The history payload is loosely typed on the wire: records may lack a
//! `status` or `outputs` section entirely, and status messages are bare
//! 2-element JSON arrays with no schema guarantee. Everything here
//! deserializes tolerantly -- absent sections become empty defaults so a
//! partial record never fails to parse.

use indexmap::IndexMap;
use serde::Deserialize;

/// Server-assigned identifier of a queued prompt.
pub type PromptId = String;

/// A full history snapshot: every job record the server knows about,
/// keyed by prompt id in the server's own order.
pub type HistorySnapshot = IndexMap<PromptId, JobRecord>;

/// Outputs of a single workflow node: output-kind name to raw value.
///
/// The reserved kind `"images"` holds an array of [`ImageRef`] objects;
/// every other kind is opaque to this library.
pub type NodeOutput = IndexMap<String, serde_json::Value>;

/// One job's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRecord {
    /// Execution status section. Absent for records the server has not
    /// started processing; absence means "not complete".
    #[serde(default)]
    pub status: Option<JobStatus>,

    /// Per-node outputs, keyed by node id.
    #[serde(default)]
    pub outputs: IndexMap<String, NodeOutput>,
}

/// The `status` section of a job record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobStatus {
    /// Whether the server considers the job finished.
    #[serde(default)]
    pub completed: bool,

    /// Coarse outcome string (`"success"`, `"error"`, ...).
    #[serde(default)]
    pub status_str: Option<String>,

    /// Execution timeline entries, nominally `[kind, payload]` arrays.
    ///
    /// Kept as raw values: entry order is not guaranteed chronological
    /// and individual entries may be malformed. The summarizer scans
    /// them leniently instead of trusting a fixed shape.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

impl JobRecord {
    /// Whether this record represents a completed job.
    pub fn is_completed(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.completed)
    }
}

/// Reference to one artifact stored on the server.
///
/// Identifies the file for a `/view` download; it does not carry content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    /// File name as the server stored it.
    pub filename: String,

    /// Subfolder under the server's output directory, often empty.
    #[serde(default)]
    pub subfolder: String,

    /// Storage area (`"output"`, `"temp"`, ...). Wire name is `type`.
    #[serde(rename = "type", default)]
    pub folder_type: String,
}
