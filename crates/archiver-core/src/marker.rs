//! `backup_completed.txt`, written into the destination after a successful run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use eyre::{Result, WrapErr};

use crate::format::{format_bytes, format_hms};
use crate::sampler::DIAGNOSTIC_LOG_NAME;
use crate::session::{SessionOutcome, TransferSession};

pub const COMPLETION_MARKER_NAME: &str = "backup_completed.txt";

#[derive(Debug, Clone)]
pub struct CompletionMarker {
    pub finished_at: DateTime<Local>,
    pub device_id: String,
    pub file_count: u64,
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub restricted_subtree_excluded: bool,
    pub diagnostics_recorded: bool,
}

impl CompletionMarker {
    pub fn from_outcome(session: &TransferSession, outcome: &SessionOutcome) -> Self {
        Self {
            finished_at: Local::now(),
            device_id: session.device_id.clone(),
            file_count: outcome.file_count,
            total_bytes: outcome.bytes_transferred,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            restricted_subtree_excluded: session.excludes_restricted_subtree,
            diagnostics_recorded: outcome.diagnostics_present,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Backup completed on {}\n",
            self.finished_at.format("%Y-%m-%d_%H-%M-%S")
        ));
        out.push_str(&format!("Device: {}\n", self.device_id));
        out.push_str(&format!("Total files: {}\n", self.file_count));
        out.push_str(&format!("Total size: {}\n", format_bytes(self.total_bytes)));
        out.push_str(&format!("Elapsed time: {}\n", format_hms(self.elapsed_secs)));
        if self.restricted_subtree_excluded {
            out.push_str("Note: Android folder was excluded due to permission restrictions\n");
        }
        if self.diagnostics_recorded {
            out.push_str(&format!(
                "Note: some files were skipped, see {DIAGNOSTIC_LOG_NAME}\n"
            ));
        }
        out
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(COMPLETION_MARKER_NAME);
        fs::write(&path, self.render())
            .wrap_err_with(|| format!("failed to write completion marker {}", path.display()))?;
        Ok(path)
    }
}
