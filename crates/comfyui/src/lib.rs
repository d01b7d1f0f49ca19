//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection management,
//! HTTP API wrappers (history retrieval, workflow submission, artifact
//! download), and a push-based completion watcher for a single ComfyUI
//! image-generation server.

pub mod api;
pub mod client;
pub mod history;
pub mod messages;
pub mod watch;
