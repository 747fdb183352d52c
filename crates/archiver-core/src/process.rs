//! Seams between the monitor and the external copy tool.
//!
//! The monitor only ever talks to these traits; `AdbTool` is the production
//! implementation and the integration tests drive the monitor with fakes.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::Child;

use crate::errors::MonitorResult;

pub type DiagnosticStream = Box<dyn AsyncRead + Send + Unpin>;

/// Handle to a running copy.
#[async_trait]
pub trait CopyProcess: Send {
    /// Non-blocking liveness check. `Ok(None)` while running,
    /// `Ok(Some(code))` once exited (`code` is `None` when killed by a signal).
    fn try_finished(&mut self) -> io::Result<Option<Option<i32>>>;

    /// Ask the process to stop and reap it.
    async fn terminate(&mut self) -> io::Result<()>;

    /// Take the diagnostic (stderr) stream. Yields `Some` at most once.
    fn take_diagnostics(&mut self) -> Option<DiagnosticStream>;
}

#[async_trait]
pub trait CopyLauncher: Send + Sync {
    async fn launch(
        &self,
        device_id: &str,
        source: &str,
        destination: &Path,
    ) -> MonitorResult<Box<dyn CopyProcess>>;
}

#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    /// Whether `path` exists on the device. Timeouts and errors read as `false`.
    async fn exists(&self, device_id: &str, path: &str) -> bool;
}

/// [`CopyProcess`] over a tokio child with piped stderr.
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl CopyProcess for ChildProcess {
    fn try_finished(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.child.try_wait()?.map(|status| status.code()))
    }

    async fn terminate(&mut self) -> io::Result<()> {
        match self.child.try_wait()? {
            Some(_) => Ok(()),
            None => self.child.kill().await,
        }
    }

    fn take_diagnostics(&mut self) -> Option<DiagnosticStream> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as DiagnosticStream)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::process::Command;

    #[tokio::test]
    async fn child_reports_exit_code_and_stderr() {
        let child = Command::new("sh")
            .args(["-c", "echo 'cannot read x' >&2; exit 3"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut process = ChildProcess::new(child);

        let mut stderr = process.take_diagnostics().unwrap();
        assert!(process.take_diagnostics().is_none());
        let mut text = String::new();
        stderr.read_to_string(&mut text).await.unwrap();
        assert_eq!(text.trim(), "cannot read x");

        let mut code = None;
        for _ in 0..200 {
            if let Some(exit) = process.try_finished().unwrap() {
                code = Some(exit);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(code, Some(Some(3)));
    }

    #[tokio::test]
    async fn terminate_stops_a_running_child() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut process = ChildProcess::new(child);
        assert_eq!(process.try_finished().unwrap(), None);
        process.terminate().await.unwrap();
        assert!(process.try_finished().unwrap().is_some());
    }
}
