//! `adb` as the copy tool, existence probe and device inventory.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{bail, eyre, Result, WrapErr};
use serde::Serialize;
use tokio::process::Command;

use crate::errors::{MonitorError, MonitorResult};
use crate::process::{ChildProcess, CopyLauncher, CopyProcess, ExistenceProbe};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const PROP_TIMEOUT: Duration = Duration::from_secs(5);

/// Folder on the device that normal apps cannot read; a full backup runs
/// into permission errors there.
pub const RESTRICTED_FOLDER: &str = "Android";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub manufacturer: String,
    pub model: String,
    pub android_version: String,
    pub build: String,
}

#[derive(Debug, Clone)]
pub struct AdbTool {
    path: PathBuf,
    probe_timeout: Duration,
}

impl AdbTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| eyre!("adb {} timed out after {:?}", args.join(" "), timeout))?
            .wrap_err_with(|| format!("failed to run adb at {}", self.path.display()))?;
        Ok(output)
    }

    async fn run_checked(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let output = self.run(args, timeout).await?;
        if !output.status.success() {
            bail!(
                "adb {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn version(&self) -> Result<String> {
        let stdout = self.run_checked(&["version"], COMMAND_TIMEOUT).await?;
        parse_version(&stdout).ok_or_else(|| eyre!("unrecognised adb version output"))
    }

    /// Attached device serials. An empty list triggers one server restart.
    pub async fn devices(&self) -> Result<Vec<String>> {
        let stdout = self.run_checked(&["devices"], COMMAND_TIMEOUT).await?;
        let devices = parse_devices(&stdout);
        if !devices.is_empty() {
            return Ok(devices);
        }

        log::info!("no devices listed; restarting adb server");
        self.run_checked(&["kill-server"], COMMAND_TIMEOUT).await?;
        self.run_checked(&["start-server"], COMMAND_TIMEOUT).await?;
        let stdout = self.run_checked(&["devices"], COMMAND_TIMEOUT).await?;
        Ok(parse_devices(&stdout))
    }

    /// Errors unless `get-state` reports the device as ready.
    pub async fn ensure_ready(&self, device_id: &str) -> Result<()> {
        let stdout = self
            .run_checked(&["-s", device_id, "get-state"], COMMAND_TIMEOUT)
            .await?;
        if !stdout.to_lowercase().contains("device") {
            bail!("device {} is not ready: {}", device_id, stdout.trim());
        }
        Ok(())
    }

    async fn prop(&self, device_id: &str, name: &str) -> String {
        let command = format!("getprop {name}");
        match self
            .run_checked(&["-s", device_id, "shell", &command], PROP_TIMEOUT)
            .await
        {
            Ok(value) if !value.trim().is_empty() => value.trim().to_owned(),
            Ok(_) => "Unknown".to_owned(),
            Err(err) => {
                log::debug!("getprop {name} on {device_id}: {err}");
                "Unknown".to_owned()
            }
        }
    }

    pub async fn device_info(&self, device_id: &str) -> DeviceInfo {
        DeviceInfo {
            serial: device_id.to_owned(),
            manufacturer: self.prop(device_id, "ro.product.manufacturer").await,
            model: self.prop(device_id, "ro.product.model").await,
            android_version: self.prop(device_id, "ro.build.version.release").await,
            build: self.prop(device_id, "ro.build.display.id").await,
        }
    }

    /// Top-level folders under `root` that can be backed up individually.
    pub async fn list_folders(&self, device_id: &str, root: &str) -> Result<Vec<String>> {
        let command = format!("ls -1 {}", shell_quote(root));
        let stdout = self
            .run_checked(&["-s", device_id, "shell", &command], COMMAND_TIMEOUT)
            .await?;
        Ok(parse_folders(&stdout))
    }
}

#[async_trait]
impl CopyLauncher for AdbTool {
    async fn launch(
        &self,
        device_id: &str,
        source: &str,
        destination: &Path,
    ) -> MonitorResult<Box<dyn CopyProcess>> {
        log::info!(
            "adb -s {} pull {} {}",
            device_id,
            source,
            destination.display()
        );
        let child = Command::new(&self.path)
            .arg("-s")
            .arg(device_id)
            .arg("pull")
            .arg(source)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                MonitorError::process(format!("{}: {}", self.path.display(), err))
            })?;
        Ok(Box::new(ChildProcess::new(child)))
    }
}

#[async_trait]
impl ExistenceProbe for AdbTool {
    async fn exists(&self, device_id: &str, path: &str) -> bool {
        let command = format!("test -d {} && echo exists", shell_quote(path));
        match self
            .run(&["-s", device_id, "shell", &command], self.probe_timeout)
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains("exists"),
            Err(err) => {
                log::warn!("existence probe for {path} failed: {err}");
                false
            }
        }
    }
}

/// Single-quote for the device shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn parse_version(stdout: &str) -> Option<String> {
    let rest = stdout.split("Version ").nth(1)?;
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let parts = version.split('.').filter(|p| !p.is_empty()).count();
    (parts == 3).then_some(version)
}

/// Serials from `adb devices`, skipping the header and blank lines.
pub fn parse_devices(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices attached"))
        .filter(|line| !line.starts_with('*'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

pub fn parse_folders(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| !name.starts_with('.') && !name.starts_with(RESTRICTED_FOLDER))
        .map(str::to_owned)
        .collect()
}
