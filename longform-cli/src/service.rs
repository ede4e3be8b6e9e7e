//! What each subcommand does, independent of argument parsing.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use longform_core::tree::FixtureProvider;
use longform_core::{
    Article, CapturePhase, CaptureService, LongformError, PeerEmulator, PeerRef, ReceivedFile, TcpGattLink,
    TransferDriver, TransferReport, TransferSession,
};

use crate::config::LongformConfig;

// ── Capture ──────────────────────────────────────────────────────

/// A finished capture and where its article was written.
#[derive(Debug)]
pub struct CapturedArticle {
    pub article: Article,
    pub phase: CapturePhase,
    pub path: Option<PathBuf>,
}

/// Run the capture loop over a JSON fixture tree and write the article
/// text next to the configured output directory.
///
/// `stop` aborts the loop; whatever was captured so far is still written.
pub async fn capture(
    config: &LongformConfig,
    fixture: &Path,
    stop: CancellationToken,
) -> Result<CapturedArticle, LongformError> {
    let json = tokio::fs::read_to_string(fixture).await?;
    let provider = FixtureProvider::from_json(&json)?;
    let service = CaptureService::with_config(provider, config.to_capture_config());

    let handle = service.handle();
    tokio::spawn(async move {
        stop.cancelled().await;
        handle.abort();
    });

    let mut presented: Option<Article> = None;
    let report = service
        .run(&mut |article: &Article| presented = Some(article.clone()))
        .await;
    info!(phase = %report.phase, ticks = report.ticks, scrolls = report.scrolls, "capture finished");

    let path = match presented {
        Some(article) => Some(write_article(&config.capture.output_dir, &article).await?),
        None => {
            warn!("nothing captured");
            None
        }
    };
    Ok(CapturedArticle {
        article: report.article,
        phase: report.phase,
        path,
    })
}

async fn write_article(dir: &Path, article: &Article) -> Result<PathBuf, LongformError> {
    tokio::fs::create_dir_all(dir).await?;
    let name = safe_file_name(&article.suggested_file_name(Local::now().date_naive()));
    let path = dir.join(name);
    tokio::fs::write(&path, article.text()).await?;
    info!("article written to {}", path.display());
    Ok(path)
}

/// Replace characters that would escape or break a single path component.
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "article.txt".into()
    } else {
        trimmed.to_string()
    }
}

// ── Send ─────────────────────────────────────────────────────────

/// Send `payload` as `name` to the peer at `address`, reporting every
/// status change to `on_status`.
pub async fn send(
    config: &LongformConfig,
    address: &str,
    name: &str,
    payload: Vec<u8>,
    stop: CancellationToken,
    mut on_status: impl FnMut(&str, u8) + Send + 'static,
) -> Result<TransferReport, LongformError> {
    let session = TransferSession::new(name, payload)?;
    let (link, events) = TcpGattLink::new();
    let driver = TransferDriver::new(link, events, config.to_transfer_config());

    let cancel = driver.cancel_token();
    tokio::spawn(async move {
        stop.cancelled().await;
        cancel.cancel();
    });

    let mut progress = driver.progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let update = progress.borrow_and_update().clone();
            on_status(&update.status, update.percent());
        }
    });

    let result = driver.run(session, PeerRef::new(address)).await;
    // The driver dropped its sender, so the watcher drains and ends.
    let _ = watcher.await;
    result
}

// ── Listen ───────────────────────────────────────────────────────

/// Emulate a peer until `stop` fires, writing every received file into
/// the configured directory.
pub async fn listen(config: &LongformConfig, stop: CancellationToken) -> Result<(), LongformError> {
    let emulator = PeerEmulator::bind(&config.listen.bind, config.to_emulator_config()).await?;
    info!("emulated peer listening on {}", emulator.local_addr()?);

    let dir = config.listen.output_dir.clone();
    tokio::fs::create_dir_all(&dir).await?;

    let (files_tx, mut files_rx) = mpsc::channel::<ReceivedFile>(8);
    let writer = tokio::spawn(async move {
        while let Some(file) = files_rx.recv().await {
            if let Err(e) = store_received(&dir, &file).await {
                warn!("could not store {}: {e}", file.name);
            }
        }
    });

    let served = emulator.serve(files_tx, stop).await;
    let _ = writer.await;
    served
}

async fn store_received(dir: &Path, file: &ReceivedFile) -> Result<PathBuf, LongformError> {
    let name = if file.name.is_empty() {
        format!("received-{}.txt", file.txn_id)
    } else {
        safe_file_name(&file.name)
    };
    let path = dir.join(name);
    tokio::fs::write(&path, &file.bytes).await?;
    info!("received {} bytes into {}", file.bytes.len(), path.display());
    Ok(path)
}

// ── Tests ────────────────────────────────────────────────────────
