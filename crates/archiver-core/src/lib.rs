//! Transfer monitoring for `adb pull` backups.
//!
//! [`monitor::TransferMonitor`] runs one session: it verifies the source on
//! the device, launches the copy, estimates progress by sampling the
//! destination tree, and decides the outcome once the copy exits.

pub mod adb;
pub mod cleanup;
pub mod config;
pub mod destination;
pub mod diagnostics;
pub mod errors;
pub mod format;
pub mod marker;
pub mod monitor;
pub mod process;
pub mod rate;
pub mod sampler;
pub mod session;

pub use cleanup::{CleanupAction, CleanupPolicy};
pub use errors::{MonitorError, MonitorResult};
pub use monitor::{MonitorSettings, ProgressSink, ProgressStatus, TransferMonitor};
pub use session::{SessionOutcome, SessionReport, SessionState, TransferSession};
