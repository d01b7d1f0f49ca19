//! Completion monitoring for a ComfyUI server.
//!
//! Watches job history for newly completed jobs, extracts their output
//! artifacts into a stable structured form, derives a coarse status and
//! execution duration from the job timeline, and dispatches the result
//! to registered listeners exactly once per job.
//!
//! The two transports (snapshot polling via [`poller::Poller`] and the
//! push watcher in `promptwatch-comfyui`) feed the same
//! [`JobRecord`](promptwatch_comfyui::history::JobRecord) shape through
//! the pipeline, so listeners are transport-agnostic.

pub mod detector;
pub mod dispatch;
pub mod extract;
pub mod poller;
pub mod source;
pub mod summary;

pub use detector::CompletionDetector;
pub use dispatch::{CompletionListener, Dispatcher, JobCompletion};
pub use extract::{collect_image_refs, extract_outputs, ExtractionResult, NodeArtifacts};
pub use poller::{Poller, PollerConfig};
pub use source::HistorySource;
pub use summary::{summarize_status, StatusSummary};
