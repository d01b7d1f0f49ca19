//! Push-based completion watcher.
//!
//! Submits one workflow and blocks on the WebSocket stream until the
//! server reports that the prompt's execution graph has finished (an
//! `executing` frame with `node: null` for our prompt id), then fetches
//! the job's history record so downstream processing sees the same
//! [`JobRecord`] shape the poller produces.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::history::{HistorySnapshot, JobRecord, PromptId};
use crate::messages::{parse_message, ComfyUIMessage};

/// Options for one push-mode watch.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Upper bound on the whole wait, from submission to the terminal
    /// frame. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Errors from a push-mode watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The WebSocket connection could not be established.
    #[error(transparent)]
    Connect(#[from] ComfyUIClientError),

    /// An HTTP call (submission or history fetch) failed.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    /// The stream ended or closed before the terminal frame arrived.
    #[error("WebSocket stream closed before execution finished")]
    StreamClosed,

    /// A protocol-level error on the established stream.
    #[error("WebSocket stream error: {0}")]
    Stream(#[from] tungstenite::Error),

    /// The configured wait timeout expired.
    #[error("Timed out after {0:?} waiting for execution to finish")]
    Timeout(Duration),

    /// Execution finished but the history snapshot had no record for
    /// the prompt.
    #[error("No history record for prompt {0}")]
    MissingRecord(PromptId),
}

/// Submit a workflow and wait for it to finish executing.
///
/// Connects the WebSocket *before* queuing the prompt so no execution
/// frame can be missed, waits for the terminal signal (bounded by
/// [`WatchOptions::timeout`] if set), then fetches the job's history
/// record. Returns the prompt id together with its record.
pub async fn submit_and_watch(
    api: &ComfyUIApi,
    client: &ComfyUIClient,
    workflow: &serde_json::Value,
    options: &WatchOptions,
) -> Result<(PromptId, JobRecord), WatchError> {
    let mut conn = client.connect().await?;
    let submitted = api.submit_workflow(workflow, &conn.client_id).await?;
    let prompt_id = submitted.prompt_id;

    tracing::info!(
        prompt_id = %prompt_id,
        queue_position = submitted.number,
        "Workflow queued, waiting for completion",
    );

    let record = await_completion(&mut conn.ws_stream, &prompt_id, options, || {
        api.history_for(&prompt_id)
    })
    .await?;

    Ok((prompt_id, record))
}

/// Wait for the terminal frame, then resolve the job's record with a
/// single history fetch.
///
/// `fetch_record` is called exactly once, and only after the terminal
/// frame arrives; it is never called when the wait fails or times out.
/// Taking the fetch as a callable keeps this step drivable by canned
/// snapshots in tests.
pub async fn await_completion<S, F, Fut>(
    stream: &mut S,
    prompt_id: &str,
    options: &WatchOptions,
    fetch_record: F,
) -> Result<JobRecord, WatchError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HistorySnapshot, ComfyUIApiError>>,
{
    match options.timeout {
        Some(limit) => {
            tokio::time::timeout(limit, wait_for_completion(stream, prompt_id))
                .await
                .map_err(|_| WatchError::Timeout(limit))??;
        }
        None => wait_for_completion(stream, prompt_id).await?,
    }

    let mut snapshot = fetch_record().await?;
    snapshot
        .shift_remove(prompt_id)
        .ok_or_else(|| WatchError::MissingRecord(prompt_id.to_string()))
}

/// Consume frames until the terminal `executing` signal for `prompt_id`.
///
/// Binary frames (latent previews) are skipped without interpretation;
/// recognized messages for other prompts are logged at debug;
/// unparseable text frames are logged and skipped. The stream ending or
/// closing before the terminal frame is [`WatchError::StreamClosed`].
pub async fn wait_for_completion<S>(stream: &mut S, prompt_id: &str) -> Result<(), WatchError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                if handle_text_frame(&text, prompt_id) {
                    return Ok(());
                }
            }
            Message::Binary(_) => {
                // Latent preview data; not interpreted.
                tracing::trace!(prompt_id, "Skipping binary preview frame");
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Handled automatically by tungstenite.
            }
            Message::Close(frame) => {
                tracing::warn!(prompt_id, ?frame, "ComfyUI WebSocket closed mid-wait");
                return Err(WatchError::StreamClosed);
            }
            Message::Frame(_) => {}
        }
    }

    Err(WatchError::StreamClosed)
}

/// Inspect one text frame. Returns `true` when it is the terminal
/// signal for `prompt_id`.
fn handle_text_frame(text: &str, prompt_id: &str) -> bool {
    match parse_message(text) {
        Ok(ComfyUIMessage::Executing(data)) => {
            if data.is_terminal_for(prompt_id) {
                tracing::info!(prompt_id, "Execution completed (all nodes done)");
                return true;
            }
            tracing::debug!(
                prompt_id = %data.prompt_id,
                node = data.node.as_deref().unwrap_or("-"),
                "Executing node",
            );
            false
        }
        Ok(ComfyUIMessage::Progress(data)) => {
            tracing::debug!(value = data.value, max = data.max, "Generation progress");
            false
        }
        Ok(ComfyUIMessage::ExecutionError(data)) => {
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error reported mid-wait",
            );
            // The terminal frame still follows; the history record
            // carries the error status.
            false
        }
        Ok(other) => {
            tracing::debug!(prompt_id, message = ?other, "ComfyUI message");
            false
        }
        Err(e) => {
            tracing::warn!(prompt_id, error = %e, raw_message = %text, "Unrecognized frame, skipping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::Cell;

    fn text(json: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn snapshot(json: &str) -> HistorySnapshot {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn terminal_frame_ends_the_wait() {
        let frames = vec![
            text(r#"{"type":"executing","data":{"node":"5","prompt_id":"p2"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"p2"}}"#),
            // Never reached; a poisoned frame past the terminal one
            // must not be polled.
            Err(tungstenite::Error::ConnectionClosed),
        ];
        let mut stream = futures::stream::iter(frames);

        wait_for_completion(&mut stream, "p2").await.unwrap();
    }

    #[tokio::test]
    async fn frames_for_other_prompts_are_skipped() {
        let frames = vec![
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"someone-else"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"mine"}}"#),
        ];
        let mut stream = futures::stream::iter(frames);

        wait_for_completion(&mut stream, "mine").await.unwrap();
    }

    #[tokio::test]
    async fn binary_and_malformed_frames_are_skipped() {
        let frames = vec![
            Ok(Message::Binary(vec![0u8; 16].into())),
            text("not json"),
            text(r#"{"type":"mystery","data":{}}"#),
            text(r#"{"type":"progress","data":{"value":1,"max":4}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
        ];
        let mut stream = futures::stream::iter(frames);

        wait_for_completion(&mut stream, "p1").await.unwrap();
    }

    #[tokio::test]
    async fn exhausted_stream_is_a_closure() {
        let mut stream = futures::stream::iter(vec![text(
            r#"{"type":"executing","data":{"node":"3","prompt_id":"p1"}}"#,
        )]);

        let err = wait_for_completion(&mut stream, "p1").await.unwrap_err();
        assert_matches!(err, WatchError::StreamClosed);
    }

    #[tokio::test]
    async fn close_frame_is_a_closure() {
        let mut stream = futures::stream::iter(vec![Ok(Message::Close(None))]);

        let err = wait_for_completion(&mut stream, "p1").await.unwrap_err();
        assert_matches!(err, WatchError::StreamClosed);
    }

    #[tokio::test]
    async fn termination_triggers_exactly_one_history_fetch() {
        let frames = vec![
            text(r#"{"type":"executing","data":{"node":"5","prompt_id":"p2"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"p2"}}"#),
        ];
        let mut stream = futures::stream::iter(frames);
        let fetches = Cell::new(0);

        let record = await_completion(&mut stream, "p2", &WatchOptions::default(), || {
            fetches.set(fetches.get() + 1);
            std::future::ready(Ok(snapshot(r#"{"p2": {"status": {"completed": true}}}"#)))
        })
        .await
        .unwrap();

        assert_eq!(fetches.get(), 1);
        assert!(record.is_completed());
    }

    #[tokio::test]
    async fn closed_stream_never_fetches_history() {
        let mut stream = futures::stream::iter(vec![text(
            r#"{"type":"executing","data":{"node":"3","prompt_id":"p1"}}"#,
        )]);
        let fetches = Cell::new(0);

        let err = await_completion(&mut stream, "p1", &WatchOptions::default(), || {
            fetches.set(fetches.get() + 1);
            std::future::ready(Ok(HistorySnapshot::new()))
        })
        .await
        .unwrap_err();

        assert_matches!(err, WatchError::StreamClosed);
        assert_eq!(fetches.get(), 0);
    }

    #[tokio::test]
    async fn snapshot_without_the_record_is_an_error() {
        let mut stream = futures::stream::iter(vec![text(
            r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#,
        )]);

        let err = await_completion(&mut stream, "p1", &WatchOptions::default(), || {
            std::future::ready(Ok(snapshot(r#"{"someone-else": {}}"#)))
        })
        .await
        .unwrap_err();

        assert_matches!(err, WatchError::MissingRecord(id) if id == "p1");
    }

    #[tokio::test]
    async fn expired_timeout_is_distinct_and_never_fetches() {
        let mut stream = futures::stream::pending::<Result<Message, tungstenite::Error>>();
        let fetches = Cell::new(0);
        let options = WatchOptions {
            timeout: Some(Duration::from_millis(10)),
        };

        let err = await_completion(&mut stream, "p1", &options, || {
            fetches.set(fetches.get() + 1);
            std::future::ready(Ok(HistorySnapshot::new()))
        })
        .await
        .unwrap_err();

        assert_matches!(err, WatchError::Timeout(_));
        assert_eq!(fetches.get(), 0);
    }

    #[tokio::test]
    async fn execution_error_does_not_end_the_wait() {
        let frames = vec![
            text(r#"{"type":"execution_error","data":{"prompt_id":"p1","node_id":"7","exception_message":"oom","exception_type":"RuntimeError"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
        ];
        let mut stream = futures::stream::iter(frames);

        wait_for_completion(&mut stream, "p1").await.unwrap();
    }
}
