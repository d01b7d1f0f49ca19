//! promptwatch -- ComfyUI job completion monitor.
//!
//! Usage:
//!   promptwatch watch [--url http://host:8188] [--interval secs]
//!   promptwatch run [--url http://host:8188] [--timeout secs] [--save-dir dir] <workflow.json>

mod console;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptwatch_comfyui::api::ComfyUIApi;
use promptwatch_comfyui::client::ComfyUIClient;
use promptwatch_comfyui::watch::{submit_and_watch, WatchOptions};
use promptwatch_monitor::{
    collect_image_refs, extract_outputs, summarize_status, CompletionListener, Dispatcher,
    JobCompletion, Poller, PollerConfig,
};

use crate::console::ConsoleListener;

#[derive(Parser)]
#[command(name = "promptwatch", version, about = "ComfyUI job completion monitor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the server and report each newly completed job
    Watch {
        /// Base HTTP URL of the ComfyUI server
        #[arg(long, default_value = "http://127.0.0.1:8188")]
        url: String,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 2.0)]
        interval: f64,
    },
    /// Submit a workflow, wait for it to finish, and report its outputs
    Run {
        /// Base HTTP URL of the ComfyUI server
        #[arg(long, default_value = "http://127.0.0.1:8188")]
        url: String,
        /// Give up after this many seconds (default: wait indefinitely)
        #[arg(long)]
        timeout: Option<f64>,
        /// Download every produced image into this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Path to the workflow JSON file to submit
        workflow: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch { url, interval } => watch(url, interval).await,
        Commands::Run {
            url,
            timeout,
            save_dir,
            workflow,
        } => run(url, timeout, save_dir, workflow).await,
    }
}

/// Poll-mode monitoring until Ctrl-C.
async fn watch(url: String, interval: f64) -> anyhow::Result<()> {
    anyhow::ensure!(interval > 0.0, "poll interval must be positive");

    let api = ComfyUIApi::new(url.trim_end_matches('/'));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Box::new(ConsoleListener::new()));

    println!("Monitoring ComfyUI jobs at {url} (every {interval} s), Ctrl-C to stop");

    let poller = Poller::spawn(
        api,
        dispatcher,
        PollerConfig {
            interval: Duration::from_secs_f64(interval),
            ..Default::default()
        },
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, stopping monitor");
    poller.stop().await;
    Ok(())
}

/// Push-mode single shot: submit one workflow and report its completion.
async fn run(
    url: String,
    timeout: Option<f64>,
    save_dir: Option<PathBuf>,
    workflow_path: PathBuf,
) -> anyhow::Result<()> {
    let workflow_text = tokio::fs::read_to_string(&workflow_path).await?;
    let workflow: serde_json::Value = serde_json::from_str(&workflow_text)?;

    let api_url = url.trim_end_matches('/').to_string();
    let api = ComfyUIApi::new(&api_url);
    let client = ComfyUIClient::new(ws_url_for(&api_url));
    let options = WatchOptions {
        timeout: timeout.map(Duration::from_secs_f64),
    };

    let (prompt_id, record) = submit_and_watch(&api, &client, &workflow, &options).await?;

    let completion = JobCompletion {
        outputs: extract_outputs(&record),
        summary: summarize_status(&record),
        prompt_id,
    };
    ConsoleListener::new().on_job_complete(&completion)?;

    if let Some(dir) = save_dir {
        save_artifacts(&api, &record, &dir).await?;
    }
    Ok(())
}

/// Download every image the job produced into `dir`.
async fn save_artifacts(
    api: &ComfyUIApi,
    record: &promptwatch_comfyui::history::JobRecord,
    dir: &Path,
) -> anyhow::Result<()> {
    let images = collect_image_refs(record);
    if images.is_empty() {
        tracing::info!("No image artifacts to save");
        return Ok(());
    }

    tokio::fs::create_dir_all(dir).await?;
    for image in &images {
        let bytes = api.fetch_artifact(image).await?;
        let path = dir.join(&image.filename);
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(file = %path.display(), bytes = bytes.len(), "Saved artifact");
    }
    println!("Saved {} file(s) to {}", images.len(), dir.display());
    Ok(())
}

/// Derive the WebSocket base URL from the HTTP base URL.
fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{api_url}")
    }
}
