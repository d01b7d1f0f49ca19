//! Completion event dispatch.
//!
//! [`Dispatcher`] fans a [`JobCompletion`] out to registered
//! [`CompletionListener`]s, synchronously and in registration order, on
//! the detecting task. A listener error is logged and swallowed so the
//! remaining listeners still run; it never affects detection state, so
//! the job will not be dispatched again.

use serde::Serialize;

use promptwatch_comfyui::history::PromptId;

use crate::extract::ExtractionResult;
use crate::summary::StatusSummary;

/// Everything a listener learns about one newly completed job.
#[derive(Debug, Clone, Serialize)]
pub struct JobCompletion {
    /// Id of the completed prompt.
    pub prompt_id: PromptId,

    /// Structured outputs extracted from the record.
    pub outputs: ExtractionResult,

    /// Coarse status and optional execution duration.
    pub summary: StatusSummary,
}

/// A reaction to a completed job.
///
/// Implementations must not assume they are the only listener, and
/// should return an error rather than panic on failure; the dispatcher
/// logs errors per listener and carries on.
pub trait CompletionListener: Send + Sync {
    fn on_job_complete(&self, completion: &JobCompletion) -> anyhow::Result<()>;
}

/// Blanket impl so plain closures can be registered directly.
impl<F> CompletionListener for F
where
    F: Fn(&JobCompletion) -> anyhow::Result<()> + Send + Sync,
{
    fn on_job_complete(&self, completion: &JobCompletion) -> anyhow::Result<()> {
        self(completion)
    }
}

/// Ordered collection of completion listeners.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<Box<dyn CompletionListener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; listeners run in registration order.
    pub fn register(&mut self, listener: Box<dyn CompletionListener>) {
        self.listeners.push(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invoke every listener with the completion, in order.
    ///
    /// One listener failing does not stop the rest.
    pub fn dispatch(&self, completion: &JobCompletion) {
        for (index, listener) in self.listeners.iter().enumerate() {
            if let Err(e) = listener.on_job_complete(completion) {
                tracing::error!(
                    prompt_id = %completion.prompt_id,
                    listener = index,
                    error = %e,
                    "Completion listener failed",
                );
            }
        }
    }
}
