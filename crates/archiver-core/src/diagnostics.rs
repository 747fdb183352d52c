//! Best-effort capture of the copy tool's stderr.
//!
//! The collector runs as its own task for as long as the copy tool keeps its
//! stderr open. Lines that look like failures are appended to the diagnostic
//! log inside the destination; everything else is dropped. Nothing in here is
//! allowed to fail the transfer, so every I/O error ends up in the debug log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lower-case fragments that mark a stderr line as worth keeping.
pub const FAILURE_MARKERS: &[&str] = &["permission denied", "failed", "cannot"];

pub fn is_failure_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// One line of the diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

/// `[HH:MM:SS] message`
impl std::fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticCollector {
    log_path: PathBuf,
}

impl DiagnosticCollector {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Start draining `stream` on a detached task. The handle resolves to the
    /// number of records written; callers may drop it without awaiting.
    pub fn spawn<R>(self, stream: R, cancel: CancellationToken) -> JoinHandle<usize>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move { self.drain(stream, cancel).await })
    }

    /// Consume `stream` until EOF, a read error, or cancellation.
    pub async fn drain<R>(&self, stream: R, cancel: CancellationToken) -> usize
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(stream).lines();
        let mut log: Option<File> = None;
        let mut log_unavailable = false;
        let mut written = 0usize;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = lines.next_line() => next,
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    log::debug!("diagnostic stream closed with error: {err}");
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() || !is_failure_line(line) {
                continue;
            }
            if log_unavailable {
                continue;
            }

            if log.is_none() {
                match OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)
                    .await
                {
                    Ok(file) => log = Some(file),
                    Err(err) => {
                        log::debug!(
                            "unable to open diagnostic log {}: {err}",
                            self.log_path.display()
                        );
                        log_unavailable = true;
                        continue;
                    }
                }
            }

            if let Some(file) = log.as_mut() {
                let record = format!("{}\n", DiagnosticRecord::now(line));
                let result = match file.write_all(record.as_bytes()).await {
                    Ok(()) => file.flush().await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(()) => written += 1,
                    Err(err) => log::debug!("failed to append diagnostic record: {err}"),
                }
            }
        }

        written
    }
}

/// Current size of the log, zero when it does not exist.
pub fn log_len(log_path: &Path) -> u64 {
    std::fs::metadata(log_path)
        .map(|meta| meta.len())
        .unwrap_or(0)
}

/// True when the log has grown past `baseline`, the size it had before the
/// run. A log left behind by an earlier run in the same directory does not
/// count.
pub fn diagnostics_grew(log_path: &Path, baseline: u64) -> bool {
    log_len(log_path) > baseline
}
