use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::cleanup::CleanupAction;

/// Device-side root of a full backup.
pub const DEVICE_STORAGE_ROOT: &str = "/sdcard";

/// Parameters of one backup run. Built once by the caller and handed to the
/// monitor, which only ever reads it.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub device_id: String,
    pub source_path: String,
    pub destination: PathBuf,
    /// Wall-clock reference for the sampler's mtime filter.
    pub start_time: SystemTime,
    /// Monotonic twin of `start_time`, used for rates and elapsed time.
    pub started_at: Instant,
    pub total_estimated_bytes: u64,
    /// Set for full backups: the restricted `Android` subtree is expected to
    /// produce permission errors that do not count against the run.
    pub excludes_restricted_subtree: bool,
    pub directory_created_by_monitor: bool,
}

impl TransferSession {
    pub fn new(
        device_id: impl Into<String>,
        source_path: impl Into<String>,
        destination: impl Into<PathBuf>,
        total_estimated_bytes: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            source_path: source_path.into(),
            destination: destination.into(),
            start_time: SystemTime::now(),
            started_at: Instant::now(),
            total_estimated_bytes,
            excludes_restricted_subtree: false,
            directory_created_by_monitor: false,
        }
    }

    pub fn excluding_restricted_subtree(mut self, excluded: bool) -> Self {
        self.excludes_restricted_subtree = excluded;
        self
    }

    pub fn with_created_directory(mut self, created: bool) -> Self {
        self.directory_created_by_monitor = created;
        self
    }

    /// Shift the session start into the past. Used when the caller prepared
    /// the destination before constructing the session.
    pub fn started_before(mut self, offset: Duration) -> Self {
        self.start_time = self
            .start_time
            .checked_sub(offset)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.started_at = self.started_at.checked_sub(offset).unwrap_or(self.started_at);
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_full_backup(&self) -> bool {
        self.source_path == DEVICE_STORAGE_ROOT
    }
}

/// One sampler observation of the destination tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub timestamp: Instant,
    pub cumulative_bytes: u64,
    pub file_count: u64,
}

/// Terminal accounting for a run that reached `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub success: bool,
    pub bytes_transferred: u64,
    pub file_count: u64,
    pub elapsed: Duration,
    pub diagnostics_present: bool,
    /// Exit code of the copy tool. Never consulted by the success rule.
    pub exit_code: Option<i32>,
}

impl SessionOutcome {
    /// Any byte on disk counts as success. The copy tool routinely exits
    /// non-zero on a full backup because the restricted subtree is unreadable.
    pub fn judge(
        bytes_transferred: u64,
        file_count: u64,
        elapsed: Duration,
        diagnostics_present: bool,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            success: bytes_transferred > 0,
            bytes_transferred,
            file_count,
            elapsed,
            diagnostics_present,
            exit_code,
        }
    }

    /// True when the copy tool reported failure but data still arrived.
    pub fn is_partial_copy(&self) -> bool {
        self.success && self.exit_code != Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Verifying,
    Running,
    Completed,
    Interrupted,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Aborted)
    }
}

/// What the monitor hands back once a session ends without a fatal error.
#[derive(Debug)]
pub enum SessionReport {
    Completed {
        outcome: SessionOutcome,
        marker: Option<PathBuf>,
        cleanup: CleanupAction,
    },
    Interrupted {
        bytes_transferred: u64,
        file_count: u64,
        elapsed: Duration,
        cleanup: CleanupAction,
    },
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { outcome, .. } if outcome.success)
    }

    pub fn cleanup(&self) -> &CleanupAction {
        match self {
            Self::Completed { cleanup, .. } | Self::Interrupted { cleanup, .. } => cleanup,
        }
    }
}
