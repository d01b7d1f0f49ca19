//! Snapshot-polling monitor loop.
//!
//! [`Poller::spawn`] starts one background task that fetches the full
//! history snapshot on a fixed interval and runs detection, extraction,
//! summarization, and dispatch sequentially on that task. The task is
//! the sole owner of the detector, so no locking is involved. A failed
//! fetch only delays detection to the next tick -- no backoff, no
//! within-tick retry.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::detector::CompletionDetector;
use crate::dispatch::{Dispatcher, JobCompletion};
use crate::extract::extract_outputs;
use crate::source::HistorySource;
use crate::summary::summarize_status;

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between snapshot fetches.
    pub interval: Duration,

    /// How long [`Poller::stop`] waits for an in-flight tick before
    /// giving up.
    pub stop_grace: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Handle to a running polling monitor.
pub struct Poller {
    task_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
    stop_grace: Duration,
}

impl Poller {
    /// Start the polling loop as a background task.
    ///
    /// The task owns `source` and `dispatcher` (with its registered
    /// listeners) for its whole life.
    pub fn spawn<S>(source: S, dispatcher: Dispatcher, config: PollerConfig) -> Self
    where
        S: HistorySource + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let stop_grace = config.stop_grace;

        let task_handle = tokio::spawn(async move {
            tracing::info!(
                interval_secs = config.interval.as_secs_f64(),
                "Completion monitor started",
            );
            run_poll_loop(source, dispatcher, config.interval, task_cancel).await;
            tracing::info!("Completion monitor stopped");
        });

        Self {
            task_handle,
            cancel,
            stop_grace,
        }
    }

    /// Request a cooperative stop and wait for the task.
    ///
    /// The stop flag is observed between ticks. Waits up to the
    /// configured grace period for an in-flight tick to finish; past
    /// that it gives up and returns -- the task may still be running,
    /// which is a hard-stop limitation, not a guarantee.
    pub async fn stop(self) {
        self.cancel.cancel();
        if tokio::time::timeout(self.stop_grace, self.task_handle)
            .await
            .is_err()
        {
            tracing::warn!(
                grace_secs = self.stop_grace.as_secs_f64(),
                "Poll task did not stop within the grace period",
            );
        }
    }
}

/// The loop body: tick, poll, repeat until cancelled.
async fn run_poll_loop<S: HistorySource>(
    source: S,
    dispatcher: Dispatcher,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut detector = CompletionDetector::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                poll_once(&source, &mut detector, &dispatcher).await;
            }
        }
    }
}

/// Run one poll cycle: fetch a snapshot, then detect, extract,
/// summarize, and dispatch each newly completed job in snapshot order.
///
/// Transport failures are logged and absorbed; the caller's schedule
/// decides when to try again.
pub async fn poll_once<S: HistorySource>(
    source: &S,
    detector: &mut CompletionDetector,
    dispatcher: &Dispatcher,
) {
    let snapshot = match source.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "History fetch failed, retrying next tick");
            return;
        }
    };

    for (prompt_id, record) in detector.detect(snapshot) {
        let completion = JobCompletion {
            outputs: extract_outputs(&record),
            summary: summarize_status(&record),
            prompt_id,
        };
        dispatcher.dispatch(&completion);
    }
}
