//! Newly-completed-job detection.
//!
//! [`CompletionDetector`] owns the set of prompt ids it has already
//! seen complete. Feeding it successive history snapshots yields each
//! completed job exactly once for the detector's lifetime, no matter
//! how often the job reappears in later snapshots.
//!
//! The set is intentionally unbounded: it holds only id strings and the
//! monitor is a bounded-lifetime process. It is never persisted and
//! must stay owned by a single task.

use std::collections::HashSet;

use promptwatch_comfyui::history::{HistorySnapshot, JobRecord, PromptId};

/// Detects jobs whose completion has not been observed before.
#[derive(Debug, Default)]
pub struct CompletionDetector {
    known: HashSet<PromptId>,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prompt ids ever marked known.
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Consume a snapshot and return the newly completed jobs, in
    /// snapshot order.
    ///
    /// A job is yielded when its record says `completed` and its id has
    /// never been yielded by this detector; it is marked known at that
    /// moment. Records without a `status` section, still-running jobs,
    /// and already-known jobs are skipped silently.
    pub fn detect(&mut self, snapshot: HistorySnapshot) -> Vec<(PromptId, JobRecord)> {
        let mut fresh = Vec::new();

        for (prompt_id, record) in snapshot {
            if self.known.contains(&prompt_id) || !record.is_completed() {
                continue;
            }
            tracing::info!(prompt_id = %prompt_id, "Detected newly completed job");
            self.known.insert(prompt_id.clone());
            fresh.push((prompt_id, record));
        }

        fresh
    }
}
