//! `ticket-reader`: watches an intake folder and writes one reply per ticket photo.
//!
//! Recognition needs Tesseract. A default build has no OCR engine and exits at
//! startup; build with `cargo build --features tesseract`.

use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use ticket_core::PipelineConfig;
use ticket_ocr::{OcrBackend, OcrError, ScratchFile, TicketPipeline};
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "ticket-reader.toml";

/// How long an arriving file must stay the same size before it is read.
#[derive(Debug, Clone, Copy)]
struct Settle {
    interval: Duration,
    attempts: u32,
}

const SETTLE: Settle = Settle { interval: Duration::from_millis(250), attempts: 120 };

/// Paths currently being handled. The watcher can report one file several
/// times, and the startup backlog can overlap with live events.
#[derive(Debug, Default)]
struct InFlight(Mutex<HashSet<PathBuf>>);

impl InFlight {
    async fn claim(&self, path: &Path) -> bool {
        self.0.lock().await.insert(path.to_path_buf())
    }

    async fn release(&self, path: &Path) {
        self.0.lock().await.remove(path);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let project_dirs = directories::ProjectDirs::from("com", "ticket-reader", "TicketReader")
        .context("no home directory to keep data in")?;
    let data_dir = project_dirs.data_dir().to_path_buf();

    let intake_dir = data_dir.join("intake");
    let replies_dir = data_dir.join("replies");
    std::fs::create_dir_all(&intake_dir).context("creating intake directory")?;
    std::fs::create_dir_all(&replies_dir).context("creating replies directory")?;

    let config = load_config(&data_dir.join(CONFIG_FILE))?;
    let backend = start_backend(&config)?;
    let pipeline = Arc::new(TicketPipeline::new(backend, config));

    // ── Intake queue ──────────────────────────────────────────────────────────
    // The channel bridges the notify watcher thread and the async dispatcher.
    let (intake_tx, mut intake_rx) = mpsc::channel::<PathBuf>(64);

    // The watcher must be kept alive for the duration of the app.
    let _watcher = ticket_ocr::spawn_intake_watcher(&intake_dir, intake_tx.clone())
        .context("starting intake folder watcher")?;
    tracing::info!("Watching intake folder: {}", intake_dir.display());

    // Files dropped in while the app was not running.
    let backlog = pending_files(&intake_dir)?;
    tokio::spawn(async move {
        for path in backlog {
            if intake_tx.send(path).await.is_err() {
                break;
            }
        }
    });

    let in_flight = Arc::new(InFlight::default());
    loop {
        tokio::select! {
            Some(path) = intake_rx.recv() => {
                if !in_flight.claim(&path).await {
                    tracing::debug!("Already handling {}", path.display());
                    continue;
                }
                let pipeline = Arc::clone(&pipeline);
                let in_flight = Arc::clone(&in_flight);
                let replies_dir = replies_dir.clone();
                tokio::spawn(async move {
                    handle(pipeline, path.clone(), replies_dir, SETTLE).await;
                    in_flight.release(&path).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn start_backend(config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrBackend>> {
    match ticket_ocr::default_backend(&config.ocr) {
        Ok(backend) => Ok(backend),
        Err(OcrError::NotAvailable) => anyhow::bail!(
            "this build has no OCR engine; rebuild ticket-reader with `--features tesseract`"
        ),
        Err(e) => Err(e).context("starting OCR engine"),
    }
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    if !path.exists() {
        tracing::info!("No {} found; using defaults", path.display());
        return Ok(PipelineConfig::default());
    }
    let config = PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn pending_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn reply_path(replies_dir: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reply".to_string());
    replies_dir.join(format!("{stem}.txt"))
}

/// Wait until `path` is non-empty and its size holds still for one interval.
/// `false` when the file vanished or never settled.
async fn wait_until_settled(path: &Path, settle: Settle) -> bool {
    let mut last: Option<u64> = None;
    for _ in 0..settle.attempts {
        let len = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => return false,
        };
        if len > 0 && last == Some(len) {
            return true;
        }
        last = Some(len);
        tokio::time::sleep(settle.interval).await;
    }
    false
}

/// One invocation per image: the intake file is consumed, the reply written.
async fn handle<R>(pipeline: Arc<TicketPipeline<R>>, path: PathBuf, replies_dir: PathBuf, settle: Settle)
where
    R: OcrBackend + 'static,
{
    if !wait_until_settled(&path, settle).await {
        if path.exists() {
            tracing::warn!("{} is still being written; leaving it in place", path.display());
        } else {
            tracing::debug!("{} is gone; nothing to do", path.display());
        }
        return;
    }

    tracing::info!("Processing ticket: {}", path.display());
    let reply = reply_path(&replies_dir, &path);

    let scratch = ScratchFile::adopt(path);
    let outcome = tokio::task::spawn_blocking(move || pipeline.process_scratch(scratch)).await;

    match outcome {
        Ok(Ok(result)) => match tokio::fs::write(&reply, result.to_reply()).await {
            Ok(()) => tracing::info!(
                rows = result.rows.len(),
                numbers = result.number_count(),
                "Reply written: {}",
                reply.display()
            ),
            Err(e) => tracing::warn!("Could not write {}: {e}", reply.display()),
        },
        Ok(Err(e)) => tracing::warn!("Ticket pipeline error: {e}"),
        Err(e) => tracing::error!("Ticket worker panicked: {e}"),
    }
}
