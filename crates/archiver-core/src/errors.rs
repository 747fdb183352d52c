//! Error categorization for the transfer monitor.
//!
//! Errors are categorized so the monitor knows how far each one may travel:
//! - Recovered: handled inside a single tick (unreadable file, vanished destination)
//! - Fatal: ends the session before monitoring begins (launch failure, missing source)
//! - Informational: reported to the operator but never a failure (partial copy)
//! - Cancelled: operator asked to stop; routed through graceful shutdown

use std::io;
use std::path::PathBuf;

/// Category of monitor error for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Swallowed where it occurs; at most one tick reports reduced progress.
    Recovered,
    /// Terminal for the session; propagated to the caller.
    Fatal,
    /// Worth telling the operator about, but does not affect the outcome.
    Informational,
    /// Operator-initiated stop.
    Cancelled,
}

#[derive(Debug)]
pub enum MonitorError {
    /// A file under the destination could not be stat'ed.
    Access { path: PathBuf, source: io::Error },
    /// The destination root disappeared while it was being sampled.
    NotFound { path: PathBuf },
    /// The external copy tool could not be started.
    Process { message: String },
    /// The requested source path does not exist on the device.
    SourceNotFound { device: String, path: String },
    /// The copy tool exited unsuccessfully after transferring data.
    PartialCopy { bytes: u64, exit_code: Option<i32> },
    /// The session was stopped by the operator.
    Cancelled,
}

impl MonitorError {
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Access { .. } | Self::NotFound { .. } => ErrorCategory::Recovered,
            Self::Process { .. } | Self::SourceNotFound { .. } => ErrorCategory::Fatal,
            Self::PartialCopy { .. } => ErrorCategory::Informational,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// True when the error terminates the session.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::NotFound { path } => write!(f, "{}: destination not found", path.display()),
            Self::Process { message } => write!(f, "failed to start copy tool: {}", message),
            Self::SourceNotFound { device, path } => {
                write!(f, "source path {} not found on device {}", path, device)
            }
            Self::PartialCopy { bytes, exit_code } => match exit_code {
                Some(code) => write!(
                    f,
                    "copy tool exited with status {} after transferring {} bytes",
                    code, bytes
                ),
                None => write!(
                    f,
                    "copy tool terminated abnormally after transferring {} bytes",
                    bytes
                ),
            },
            Self::Cancelled => write!(f, "backup interrupted by user"),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Access { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Map an IO error raised while sampling `path` onto the monitor taxonomy.
pub fn classify_sampling_error(path: PathBuf, err: io::Error) -> MonitorError {
    match err.kind() {
        io::ErrorKind::NotFound => MonitorError::NotFound { path },
        _ => MonitorError::Access { path, source: err },
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
