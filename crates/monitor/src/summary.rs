//! Coarse status and execution-duration derivation.
//!
//! Reads the `status` section of a job record: the outcome string
//! (defaulting to `"unknown"`) and, when the timeline carries both an
//! `execution_start` and an `execution_success` timestamp, the wall
//! duration between them. Timeline entries are matched by kind, never
//! by position (the sequence is not guaranteed chronological), and
//! malformed entries are skipped, not fatal.

use serde::Serialize;
use serde_json::Value;

use promptwatch_comfyui::history::JobRecord;

/// Derived status of one completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    /// Outcome string from the record (`"success"`, `"error"`, ...);
    /// `"unknown"` when absent.
    pub status: String,

    /// Wall-clock execution time, present only when the timeline holds
    /// both a start and a success timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_seconds: Option<f64>,
}

/// Summarize the status section of a job record.
pub fn summarize_status(record: &JobRecord) -> StatusSummary {
    let Some(status) = record.status.as_ref() else {
        return StatusSummary {
            status: "unknown".to_string(),
            execution_time_seconds: None,
        };
    };

    let mut start_ms = None;
    let mut end_ms = None;

    for entry in &status.messages {
        let Some((kind, timestamp)) = timeline_timestamp(entry) else {
            continue;
        };
        // Duplicate kinds: last one wins.
        match kind {
            "execution_start" => start_ms = Some(timestamp),
            "execution_success" => end_ms = Some(timestamp),
            _ => {}
        }
    }

    let execution_time_seconds = match (start_ms, end_ms) {
        (Some(start), Some(end)) => Some((end - start) as f64 / 1000.0),
        _ => None,
    };

    StatusSummary {
        status: status
            .status_str
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        execution_time_seconds,
    }
}

/// Pull `(kind, timestamp)` out of one timeline entry, if well-formed.
///
/// An entry counts when it is a `[kind, payload, ...]` array whose
/// payload object carries an integer `timestamp` in milliseconds.
fn timeline_timestamp(entry: &Value) -> Option<(&str, i64)> {
    let parts = entry.as_array()?;
    if parts.len() < 2 {
        return None;
    }
    let kind = parts[0].as_str()?;
    let timestamp = parts[1].get("timestamp")?.as_i64()?;
    Some((kind, timestamp))
}
