use std::fs;
use std::io;

use crate::session::TransferSession;

/// What happened to the destination after a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// The run succeeded; nothing to clean.
    NotRequired,
    /// The directory existed before the run (merge mode) and was kept.
    Preserved,
    /// The directory was created by this run and has been removed.
    Removed,
    /// The directory was created by this run but is already gone.
    AlreadyGone,
    /// Removal was attempted and failed. Not retried.
    Failed(String),
}

impl CleanupAction {
    pub fn describe(&self) -> String {
        match self {
            Self::NotRequired => "no cleanup required".to_owned(),
            Self::Preserved => {
                "backup directory not cleaned (may contain existing files)".to_owned()
            }
            Self::Removed => "partial backup removed".to_owned(),
            Self::AlreadyGone => "backup directory already removed".to_owned(),
            Self::Failed(reason) => format!("cleanup failed: {reason}"),
        }
    }
}

/// Decides whether a failed run may delete its destination. Only directories
/// this run created are ever removed; merged directories hold user data.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupPolicy;

impl CleanupPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn maybe_cleanup(&self, session: &TransferSession, succeeded: bool) -> CleanupAction {
        if succeeded {
            return CleanupAction::NotRequired;
        }
        if !session.directory_created_by_monitor {
            log::info!(
                "keeping pre-existing destination {}",
                session.destination.display()
            );
            return CleanupAction::Preserved;
        }

        match fs::remove_dir_all(&session.destination) {
            Ok(()) => {
                log::info!(
                    "removed partial backup at {}",
                    session.destination.display()
                );
                CleanupAction::Removed
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => CleanupAction::AlreadyGone,
            Err(err) => {
                log::warn!(
                    "failed to remove {}: {err}",
                    session.destination.display()
                );
                CleanupAction::Failed(err.to_string())
            }
        }
    }
}
