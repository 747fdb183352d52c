//! Destination tree measurement.
//!
//! The copy tool offers no progress callback, so progress is inferred from
//! what has landed on disk since the session started.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::errors::{classify_sampling_error, MonitorError, MonitorResult};

/// File the diagnostic collector appends to inside the destination.
pub const DIAGNOSTIC_LOG_NAME: &str = "backup_errors.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeSnapshot {
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Source of progress measurements for the monitor loop.
pub trait Sampler: Send + Sync + 'static {
    /// Measure files under `root` modified at or after `since`. Never fails:
    /// an unreadable or vanished tree reads as zero progress.
    fn sample(&self, root: &Path, since: SystemTime) -> SizeSnapshot;
}

#[derive(Debug, Clone)]
pub struct SizeSampler {
    skip_name: String,
}

impl Default for SizeSampler {
    fn default() -> Self {
        Self {
            skip_name: DIAGNOSTIC_LOG_NAME.to_owned(),
        }
    }
}

impl SizeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`Sampler::sample`], but reports a vanished root as
    /// [`MonitorError::NotFound`] instead of an empty snapshot.
    pub fn try_sample(&self, root: &Path, since: SystemTime) -> MonitorResult<SizeSnapshot> {
        let mut snapshot = SizeSnapshot::default();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        let path = err.path().unwrap_or(root).to_path_buf();
                        let io_err = err
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other("filesystem loop"));
                        return Err(classify_sampling_error(path, io_err));
                    }
                    log::trace!("skipping unreadable entry: {err}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() == self.skip_name.as_str() {
                continue;
            }

            match file_size_if_recent(&entry, since) {
                Ok(Some(size)) => {
                    snapshot.total_bytes += size;
                    snapshot.file_count += 1;
                }
                Ok(None) => {}
                Err(err) => log::trace!("{err}"),
            }
        }

        Ok(snapshot)
    }
}

fn file_size_if_recent(entry: &walkdir::DirEntry, since: SystemTime) -> MonitorResult<Option<u64>> {
    let metadata = entry.metadata().map_err(|err| {
        let io_err = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("metadata unavailable"));
        classify_sampling_error(entry.path().to_path_buf(), io_err)
    })?;
    let modified = metadata
        .modified()
        .map_err(|err| classify_sampling_error(entry.path().to_path_buf(), err))?;
    if modified >= since {
        Ok(Some(metadata.len()))
    } else {
        Ok(None)
    }
}

impl Sampler for SizeSampler {
    fn sample(&self, root: &Path, since: SystemTime) -> SizeSnapshot {
        match self.try_sample(root, since) {
            Ok(snapshot) => snapshot,
            Err(err @ MonitorError::NotFound { .. }) => {
                log::debug!("{err}; reporting zero progress");
                SizeSnapshot::default()
            }
            Err(err) => {
                log::debug!("sampling failed: {err}");
                SizeSnapshot::default()
            }
        }
    }
}
