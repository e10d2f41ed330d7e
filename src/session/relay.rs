//! Side-channel file daemons
//!
//! - `InputRelay` tails an append-only file and types each new line into the pane
//! - `OutputCapture` keeps a file overwritten with the pane's filtered output
//!
//! Both loop on a fixed interval while the session exists and stop quietly
//! when it disappears or their cancellation token fires.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionBackend;
use crate::classifier::{SharedClassifier, display_lines};
use crate::error::Result;
use crate::tmux::CapturedContent;

/// Sleep for `interval` unless cancelled first; returns false when cancelled
pub(crate) async fn tick(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

/// Types lines appended to the input file into the session
pub struct InputRelay<B: SessionBackend + ?Sized> {
    path: PathBuf,
    offset: u64,
    /// Bytes after the last newline, possibly ending inside a UTF-8 sequence
    pending: Vec<u8>,
    /// Complete lines not yet typed into the session
    queued: VecDeque<String>,
    interval: Duration,
    backend: std::sync::Arc<B>,
    classifier: Option<SharedClassifier>,
}

impl<B: SessionBackend + ?Sized> InputRelay<B> {
    /// Start relaying from the current end of `path`
    pub async fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        backend: std::sync::Arc<B>,
        classifier: Option<SharedClassifier>,
    ) -> Self {
        let path = path.into();
        // Lines written before this session started are not replayed
        let offset = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Self {
            path,
            offset,
            pending: Vec::new(),
            queued: VecDeque::new(),
            interval,
            backend,
            classifier,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Input relay watching {:?}", self.path);
        while tick(&cancel, self.interval).await {
            if !self.backend.is_alive().await {
                debug!("Session gone, input relay stopping");
                break;
            }
            if let Err(e) = self.poll_once().await {
                warn!("Input relay: {}", e);
            }
        }
    }

    /// Inject every complete line appended since the last poll
    ///
    /// A line stays queued until the session accepts it, so a failed send is
    /// retried on the next poll.
    pub async fn poll_once(&mut self) -> Result<usize> {
        self.read_new_lines().await?;

        let mut delivered = 0;
        while let Some(line) = self.queued.front() {
            self.backend.send_line(line).await?;
            self.queued.pop_front();
            delivered += 1;
            if let Some(classifier) = &self.classifier {
                classifier.lock().await.on_user_input();
            }
        }
        Ok(delivered)
    }

    async fn read_new_lines(&mut self) -> Result<()> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if len < self.offset {
            debug!("Input file truncated, rewinding");
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;
        self.offset += bytes.len() as u64;
        self.pending.extend_from_slice(&bytes);

        // Decode only whole lines so a character split across writes stays intact
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            self.queued
                .push_back(line.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(())
    }
}

/// Writes the pane's filtered output to the snapshot file
pub struct OutputCapture<B: SessionBackend + ?Sized> {
    path: PathBuf,
    interval: Duration,
    backend: std::sync::Arc<B>,
    classifier: Option<SharedClassifier>,
    last_hash: Option<u64>,
}

impl<B: SessionBackend + ?Sized> OutputCapture<B> {
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        backend: std::sync::Arc<B>,
        classifier: Option<SharedClassifier>,
    ) -> Self {
        Self {
            path: path.into(),
            interval,
            backend,
            classifier,
            last_hash: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Output capture writing {:?}", self.path);
        while tick(&cancel, self.interval).await {
            if !self.backend.is_alive().await {
                debug!("Session gone, output capture stopping");
                break;
            }
            if let Err(e) = self.poll_once().await {
                warn!("Output capture: {}", e);
            }
        }
    }

    /// Capture, filter and write the snapshot if it changed
    pub async fn poll_once(&mut self) -> Result<bool> {
        let raw = self.backend.capture().await?;
        let lines = display_lines(self.classifier.as_ref(), &raw).await;
        let snapshot = CapturedContent::new(lines.join("\n"));

        if !snapshot.differs_from(self.last_hash) {
            return Ok(false);
        }

        write_snapshot(&self.path, &snapshot.content).await?;
        self.last_hash = Some(snapshot.hash);
        Ok(true)
    }
}

async fn write_snapshot(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Readers never observe a half-written snapshot
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
