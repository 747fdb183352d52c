#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::tempdir;

use wait_timeout::ChildExt;

/// Stand-in for adb: answers the handful of commands the CLI issues.
/// `FAKE_ADB_PULL=empty` makes `pull` copy nothing.
pub const FAKE_ADB: &str = r#"#!/bin/sh
if [ "$1" = "version" ]; then
  echo "Android Debug Bridge version 1.0.41"
  echo "Version 35.0.2-12147458"
  exit 0
fi
if [ "$1" = "devices" ]; then
  printf 'List of devices attached\nFAKE123\tdevice\n\n'
  exit 0
fi
if [ "$1" = "-s" ]; then
  case "$3" in
    get-state) echo device ;;
    shell)
      case "$4" in
        test*) echo exists ;;
        ls*) printf 'DCIM\nMusic\nAndroid\n.thumbnails\n' ;;
        getprop*) echo Fake ;;
      esac ;;
    pull)
      sleep 0.3
      if [ "$FAKE_ADB_PULL" != "empty" ]; then
        mkdir -p "$5/DCIM"
        printf 'hello world' > "$5/DCIM/a.jpg"
        echo "adb: error: failed to copy '/sdcard/Android/data/x': Permission denied" >&2
      fi
      echo "pulled 1 file" >&2
      ;;
  esac
  exit 0
fi
exit 1
"#;

pub struct TestContext {
    pub _work: tempfile::TempDir,
    pub workspace: PathBuf,
    pub cli_bin: PathBuf,
    pub config_dir: PathBuf,
    pub fake_adb: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let work = tempdir().expect("tempdir");
        let workspace = work.path().to_path_buf();

        let config_dir = workspace.join("cli-config");
        fs::create_dir_all(&config_dir).expect("cli config");
        let config = format!(
            "backup_location = \"{}\"\ntick_millis = 50\nprobe_timeout_secs = 5\n",
            workspace.join("backups").display()
        );
        fs::write(config_dir.join("archiver.toml"), config).expect("write config");

        let fake_adb = workspace.join("fake-adb");
        fs::write(&fake_adb, FAKE_ADB).expect("write fake adb");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&fake_adb, fs::Permissions::from_mode(0o755))
                .expect("chmod fake adb");
        }

        Self {
            _work: work,
            workspace,
            cli_bin: PathBuf::from(env!("CARGO_BIN_EXE_archiver")),
            config_dir,
            fake_adb,
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.cli_bin);
        cmd.arg("--config-dir")
            .arg(&self.config_dir)
            .env_remove("ARCHIVER_LOG")
            .stdin(Stdio::null());
        cmd
    }
}

pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::process::Output {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn command");

    match child.wait_timeout(timeout).expect("wait for process") {
        Some(_status) => child
            .wait_with_output()
            .expect("collect command output after completion"),
        None => {
            let _ = child.kill();
            let output = child
                .wait_with_output()
                .expect("collect output after killing command");
            panic!(
                "command timed out after {:?}\nstdout:\n{}\nstderr:\n{}",
                timeout,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }
}
