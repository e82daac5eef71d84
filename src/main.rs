//! Book Narrator - narrate a document with a voice cloned from a short sample.
//!
//! Synthesis is blocking and resource heavy, so the whole session lives on a
//! blocking worker thread; the async side handles signals and progress logs.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use book_narrator::config::AppConfig;
use book_narrator::pipeline::{Progress, RunReport, RunState};
use book_narrator::text::{Document, DocumentMeta};
use book_narrator::tts::build_synthesizer;
use book_narrator::{CancelHandle, NarratorError, ProgressHandle, Session};

/// Run summary printed on stdout.
#[derive(Debug, Serialize)]
struct Summary {
    title: String,
    chunks: usize,
    run: RunReport,
    progress: Progress,
    output: Option<PathBuf>, // None when nothing could be assembled
    track_secs: f32,
    included: Vec<usize>,
    missing: Vec<usize>,
}

/// Load inputs, generate and export. Runs on a blocking thread.
///
/// # Arguments
/// * `config` - Application configuration
/// * `ready` - Receives the progress and cancel handles once the session exists
fn narrate(config: &AppConfig, ready: oneshot::Sender<(ProgressHandle, CancelHandle)>) -> Result<Summary> {
    let synthesizer = build_synthesizer(config)?;
    let mut session = Session::new(synthesizer, config.session_config());
    // the receiver is gone only if main already returned
    let _ = ready.send((session.progress_handle(), session.cancel_handle()));

    session.configure(config.voice_settings())?;

    let text_path = config.text.as_deref().context("--text is required")?;
    let raw = fs::read_to_string(text_path).with_context(|| format!("Failed to read text file {}", text_path.display()))?;
    let mut meta = DocumentMeta::from_path(text_path);
    if let Some(title) = &config.title {
        meta.title = title.clone();
    }
    let title = meta.title.clone();
    session.submit_document(Document::new(&raw, meta))?;

    let voice_path = config.voice.as_deref().context("--voice is required")?;
    let sample = fs::read(voice_path).with_context(|| format!("Failed to read voice sample {}", voice_path.display()))?;
    session.submit_voice_sample(&sample)?;

    let report = session.run(config.run_mode()?)?;

    let track = match session.export_track(&config.output, config.export_format) {
        Ok(track) => Some(track),
        Err(NarratorError::NothingToExport) => {
            warn!("⚠️ No finished audio to export");
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Summary {
        title,
        chunks: session.chunks().len(),
        run: report,
        progress: session.progress(),
        output: track.as_ref().map(|_| config.output.clone()),
        track_secs: track.as_ref().map_or(0.0, |t| t.duration().as_secs_f32()),
        included: track.as_ref().map(|t| t.included.clone()).unwrap_or_default(),
        missing: track.map(|t| t.missing).unwrap_or_default(),
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, finishing current chunk...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, finishing current chunk...");
        }
    }
}

fn log_progress(progress: &Progress) {
    info!(
        "⏳ Progress: {}/{} done, {} failed ({:.0}%)",
        progress.done,
        progress.total,
        progress.failed,
        progress.fraction_done() * 100.0
    );
}

/// True for errors caused by the user's inputs rather than the system.
fn is_input_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<NarratorError>(), Some(NarratorError::Input(_)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .context("Failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("📚 Book Narrator v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    let (ready_tx, ready_rx) = oneshot::channel();
    let worker_config = config.clone();
    let mut worker = tokio::task::spawn_blocking(move || narrate(&worker_config, ready_tx));

    let handles = ready_rx.await.ok();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.progress_interval_ms));
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut cancelled = false;

    let result = loop {
        tokio::select! {
            result = &mut worker => break result,
            _ = &mut shutdown, if !cancelled => {
                cancelled = true;
                if let Some((_, cancel)) = &handles {
                    cancel.cancel();
                }
            }
            _ = ticker.tick() => {
                if let Some((progress, _)) = &handles
                    && progress.run_state() == RunState::Running
                {
                    log_progress(&progress.progress());
                }
            }
        }
    };

    match result.context("Narration worker panicked")? {
        Ok(summary) => {
            log_progress(&summary.progress);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            debug!("Run state: {:?}", summary.run.state);
            info!("✅ Narration finished");
            Ok(())
        }
        Err(e) if is_input_error(&e) => {
            error!("❌ {:#}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}
