//! Console listener: renders each completion to stdout.
//!
//! Pure presentation: consumes [`JobCompletion`] read-only and keeps
//! no state beyond a task counter. Diagnostics still go through
//! `tracing`; this output is the user-facing report.

use std::sync::atomic::{AtomicUsize, Ordering};

use promptwatch_monitor::{CompletionListener, JobCompletion, NodeArtifacts};
use serde_json::Value;

/// Prints completed jobs as numbered reports.
#[derive(Default)]
pub struct ConsoleListener {
    counter: AtomicUsize,
}

impl ConsoleListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionListener for ConsoleListener {
    fn on_job_complete(&self, completion: &JobCompletion) -> anyhow::Result<()> {
        let number = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let now = chrono::Local::now().format("%H:%M:%S");

        println!();
        println!("[{now}] Job #{number} complete: {}", completion.prompt_id);
        match completion.summary.execution_time_seconds {
            Some(secs) => println!("  status: {} ({secs:.2} s)", completion.summary.status),
            None => println!("  status: {}", completion.summary.status),
        }

        if !completion.outputs.output_files.is_empty() {
            println!("  files:");
            for (i, file) in completion.outputs.output_files.iter().enumerate() {
                println!("    {}. {file}", i + 1);
            }
        }

        if !completion.outputs.per_node.is_empty() {
            println!("  node outputs:");
            for (node_id, artifacts) in &completion.outputs.per_node {
                println!("    node {node_id}: {}", render_artifacts(artifacts));
            }
        }

        Ok(())
    }
}

/// One-line rendition of a node's outputs.
fn render_artifacts(artifacts: &NodeArtifacts) -> String {
    match artifacts {
        NodeArtifacts::Files(files) => files.join(", "),
        NodeArtifacts::Mixed(kinds) => kinds
            .iter()
            .map(|(kind, value)| format!("{kind}: {}", render_value(value)))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

/// Compact rendition of an arbitrary output value.
fn render_value(value: &Value) -> String {
    match value {
        Value::Array(items) if items.len() > 3 => format!("[list, {} items]", items.len()),
        other => other.to_string(),
    }
}
