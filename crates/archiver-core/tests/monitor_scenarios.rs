use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use archiver_core::cleanup::CleanupAction;
use archiver_core::errors::{MonitorError, MonitorResult};
use archiver_core::marker::COMPLETION_MARKER_NAME;
use archiver_core::monitor::{MonitorSettings, ProgressSink, ProgressStatus, TransferMonitor};
use archiver_core::process::{CopyLauncher, CopyProcess, DiagnosticStream, ExistenceProbe};
use archiver_core::sampler::{Sampler, SizeSampler, SizeSnapshot, DIAGNOSTIC_LOG_NAME};
use archiver_core::session::{SessionReport, SessionState, TransferSession};
use async_trait::async_trait;
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(20);

/// What the fake copy tool does once launched.
#[derive(Clone, Default)]
struct Script {
    /// Files written into the destination, relative path and size.
    files: Vec<(&'static str, usize)>,
    stderr: &'static str,
    exit_code: i32,
    /// Never exits on its own; only `terminate` stops it.
    runs_forever: bool,
    refuse_launch: bool,
}

struct FakeProcess {
    done: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
    exit_code: i32,
    stderr: Option<&'static str>,
}

#[async_trait]
impl CopyProcess for FakeProcess {
    fn try_finished(&mut self) -> io::Result<Option<Option<i32>>> {
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(Some(None));
        }
        if self.done.load(Ordering::SeqCst) {
            return Ok(Some(Some(self.exit_code)));
        }
        Ok(None)
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn take_diagnostics(&mut self) -> Option<DiagnosticStream> {
        self.stderr
            .take()
            .map(|text| Box::new(Cursor::new(text.as_bytes().to_vec())) as DiagnosticStream)
    }
}

#[derive(Default)]
struct FakeLauncher {
    script: Script,
    launches: AtomicUsize,
    terminated: Arc<AtomicBool>,
}

impl FakeLauncher {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Self::default()
        })
    }
}

#[async_trait]
impl CopyLauncher for FakeLauncher {
    async fn launch(
        &self,
        _device_id: &str,
        _source: &str,
        destination: &Path,
    ) -> MonitorResult<Box<dyn CopyProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.script.refuse_launch {
            return Err(MonitorError::process("adb: No such file or directory"));
        }

        let done = Arc::new(AtomicBool::new(false));
        let files = self.script.files.clone();
        let dest = destination.to_path_buf();
        let runs_forever = self.script.runs_forever;
        let done_flag = Arc::clone(&done);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            for (rel, size) in files {
                let path = dest.join(rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(path, vec![7u8; size]).unwrap();
            }
            if !runs_forever {
                tokio::time::sleep(Duration::from_millis(50)).await;
                done_flag.store(true, Ordering::SeqCst);
            }
        });

        Ok(Box::new(FakeProcess {
            done,
            terminated: Arc::clone(&self.terminated),
            exit_code: self.script.exit_code,
            stderr: Some(self.script.stderr),
        }))
    }
}

struct FakeProbe(bool);

#[async_trait]
impl ExistenceProbe for FakeProbe {
    async fn exists(&self, _device_id: &str, _path: &str) -> bool {
        self.0
    }
}

/// Replays a fixed series of snapshots, repeating the last one.
struct ScriptedSampler {
    snapshots: Mutex<Vec<SizeSnapshot>>,
}

impl ScriptedSampler {
    fn new(bytes: &[u64]) -> Arc<Self> {
        let mut snapshots: Vec<SizeSnapshot> = bytes
            .iter()
            .map(|b| SizeSnapshot {
                total_bytes: *b,
                file_count: 1,
            })
            .collect();
        snapshots.reverse();
        Arc::new(Self {
            snapshots: Mutex::new(snapshots),
        })
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&self, _root: &Path, _since: SystemTime) -> SizeSnapshot {
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            snapshots.pop().unwrap()
        } else {
            snapshots[0]
        }
    }
}

/// Simulates an operator interrupt landing mid-sample: the token fires and
/// the copy tool dies from the same signal before the tick finishes.
struct InterruptingSampler {
    cancel: CancellationToken,
    killed: Arc<AtomicBool>,
}

impl Sampler for InterruptingSampler {
    fn sample(&self, _root: &Path, _since: SystemTime) -> SizeSnapshot {
        self.cancel.cancel();
        self.killed.store(true, Ordering::SeqCst);
        SizeSnapshot {
            total_bytes: 4096,
            file_count: 1,
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    statuses: Vec<ProgressStatus>,
    finished: bool,
}

impl ProgressSink for RecordingSink {
    fn render(&mut self, status: &ProgressStatus) {
        self.statuses.push(*status);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

fn session(dest: &Path, created: bool, total: u64) -> TransferSession {
    TransferSession::new("R58M123ABC", "/sdcard", dest, total)
        .excluding_restricted_subtree(true)
        .with_created_directory(created)
        .started_before(Duration::from_secs(2))
}

fn monitor(
    session: TransferSession,
    launcher: Arc<FakeLauncher>,
    probe_ok: bool,
    sampler: Arc<dyn Sampler>,
) -> TransferMonitor {
    TransferMonitor::new(session, launcher, Arc::new(FakeProbe(probe_ok)), sampler).with_settings(
        MonitorSettings {
            tick: TICK,
            bar_width: 10,
        },
    )
}

fn new_dest(root: &Path) -> PathBuf {
    let dest = root.join("backup");
    fs::create_dir_all(&dest).unwrap();
    dest
}

#[tokio::test]
async fn zero_bytes_fails_without_marker_and_removes_created_directory() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script::default());
    let mut monitor = monitor(
        session(&dest, true, 1_000),
        launcher.clone(),
        true,
        Arc::new(SizeSampler::new()),
    );

    let mut sink = RecordingSink::default();
    let report = monitor.run(&mut sink, CancellationToken::new()).await.unwrap();

    match report {
        SessionReport::Completed {
            outcome,
            marker,
            cleanup,
        } => {
            assert!(!outcome.success);
            assert_eq!(outcome.bytes_transferred, 0);
            assert!(marker.is_none());
            assert_eq!(cleanup, CleanupAction::Removed);
        }
        other => panic!("unexpected report {other:?}"),
    }
    assert_eq!(monitor.state(), SessionState::Completed);
    assert!(!dest.exists());
    assert!(sink.finished);
}

#[tokio::test]
async fn zero_bytes_in_merge_mode_keeps_directory() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let old = dest.join("earlier.jpg");
    fs::write(&old, vec![0u8; 64]).unwrap();
    set_file_mtime(
        &old,
        FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600)),
    )
    .unwrap();

    let launcher = FakeLauncher::new(Script::default());
    let mut monitor = monitor(
        session(&dest, false, 1_000),
        launcher,
        true,
        Arc::new(SizeSampler::new()),
    );
    let report = monitor
        .run(&mut RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.cleanup(), &CleanupAction::Preserved);
    assert!(old.exists());
    assert!(!dest.join(COMPLETION_MARKER_NAME).exists());
}

#[tokio::test]
async fn progress_clamps_against_the_estimate() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script {
        runs_forever: true,
        ..Script::default()
    });
    let sampler = ScriptedSampler::new(&[5_000_000_000, 5_000_000_000, 12_000_000_000]);
    let mut monitor = monitor(session(&dest, false, 10_000_000_000), launcher, true, sampler);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(TICK * 8).await;
        trigger.cancel();
    });

    let mut sink = RecordingSink::default();
    monitor.run(&mut sink, cancel).await.unwrap();

    assert!(sink.statuses.len() >= 3, "expected several ticks");
    assert_eq!(sink.statuses[0].percent, 50.0);
    assert!(sink.statuses[0]
        .render_line(10)
        .starts_with("[█████░░░░░] 50.0%"));
    assert!(sink.statuses.iter().all(|s| s.percent <= 100.0));
    assert_eq!(sink.statuses.last().unwrap().percent, 100.0);
    assert!(sink
        .statuses
        .iter()
        .all(|s| s.rate_bytes_per_sec >= 0.0 && s.eta_secs.is_finite()));
}

#[tokio::test]
async fn only_failure_lines_are_logged_and_partial_copy_still_succeeds() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script {
        files: vec![("DCIM/Camera/IMG_0001.jpg", 4096), ("Download/a.pdf", 1000)],
        stderr: "Permission denied: /a/b\ncopied ok\n",
        exit_code: 1,
        ..Script::default()
    });
    let mut monitor = monitor(
        session(&dest, true, 10_000),
        launcher,
        true,
        Arc::new(SizeSampler::new()),
    );

    let report = monitor
        .run(&mut RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap();

    let SessionReport::Completed {
        outcome, marker, ..
    } = report
    else {
        panic!("expected completion");
    };
    assert!(outcome.success, "non-zero exit with data is still a success");
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.bytes_transferred, 5096);
    assert_eq!(outcome.file_count, 2);
    assert!(outcome.diagnostics_present);

    let log = fs::read_to_string(dest.join(DIAGNOSTIC_LOG_NAME)).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with('[') && lines[0].ends_with("] Permission denied: /a/b"));
    assert!(!log.contains("copied ok"));

    let marker = fs::read_to_string(marker.expect("marker path")).unwrap();
    assert!(marker.contains("Device: R58M123ABC"));
    assert!(marker.contains("Total files: 2"));
    assert!(marker.contains("Android folder was excluded"));
    assert!(marker.contains(DIAGNOSTIC_LOG_NAME));
}

#[tokio::test]
async fn cancellation_in_merge_mode_terminates_and_preserves() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    fs::write(dest.join("keep.txt"), b"existing").unwrap();
    let launcher = FakeLauncher::new(Script {
        files: vec![("DCIM/partial.jpg", 512)],
        runs_forever: true,
        ..Script::default()
    });
    let mut monitor = monitor(
        session(&dest, false, 10_000),
        launcher.clone(),
        true,
        Arc::new(SizeSampler::new()),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let report = monitor
        .run(&mut RecordingSink::default(), cancel)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    match report {
        SessionReport::Interrupted { cleanup, .. } => {
            assert_eq!(cleanup, CleanupAction::Preserved)
        }
        other => panic!("unexpected report {other:?}"),
    }
    assert_eq!(monitor.state(), SessionState::Interrupted);
    assert!(launcher.terminated.load(Ordering::SeqCst));
    assert!(dest.join("keep.txt").exists());
    assert!(!dest.join(COMPLETION_MARKER_NAME).exists());
}

#[tokio::test]
async fn cancellation_removes_a_directory_the_run_created() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script {
        files: vec![("DCIM/partial.jpg", 512)],
        runs_forever: true,
        ..Script::default()
    });
    let mut monitor = monitor(
        session(&dest, true, 10_000),
        launcher,
        true,
        Arc::new(SizeSampler::new()),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        trigger.cancel();
    });

    let report = monitor.run(&mut RecordingSink::default(), cancel).await.unwrap();
    assert_eq!(report.cleanup(), &CleanupAction::Removed);
    assert!(!dest.exists());
}

#[tokio::test]
async fn missing_source_aborts_before_launch() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script::default());
    let mut monitor = monitor(
        session(&dest, true, 10_000),
        launcher.clone(),
        false,
        Arc::new(SizeSampler::new()),
    );

    let mut sink = RecordingSink::default();
    let err = monitor
        .run(&mut sink, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::SourceNotFound { .. }));
    assert_eq!(monitor.state(), SessionState::Aborted);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    assert!(sink.statuses.is_empty());
    assert!(!dest.exists());
}

#[tokio::test]
async fn launch_failure_is_fatal() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script {
        refuse_launch: true,
        ..Script::default()
    });
    let mut monitor = monitor(
        session(&dest, false, 10_000),
        launcher,
        true,
        Arc::new(SizeSampler::new()),
    );

    let err = monitor
        .run(&mut RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, MonitorError::Process { .. }));
    assert_eq!(monitor.state(), SessionState::Aborted);
    assert!(dest.exists());
}

#[tokio::test]
async fn interrupt_that_kills_the_copy_is_not_a_success() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script {
        runs_forever: true,
        ..Script::default()
    });
    let cancel = CancellationToken::new();
    let sampler = Arc::new(InterruptingSampler {
        cancel: cancel.clone(),
        killed: Arc::clone(&launcher.terminated),
    });
    let mut monitor = monitor(session(&dest, false, 10_000), launcher, true, sampler);

    let report = monitor
        .run(&mut RecordingSink::default(), cancel)
        .await
        .unwrap();

    match report {
        SessionReport::Interrupted { cleanup, .. } => {
            assert_eq!(cleanup, CleanupAction::Preserved)
        }
        other => panic!("unexpected report {other:?}"),
    }
    assert_eq!(monitor.state(), SessionState::Interrupted);
    assert!(!dest.join(COMPLETION_MARKER_NAME).exists());
}

#[tokio::test]
async fn cancellation_before_launch_never_starts_the_copy() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let launcher = FakeLauncher::new(Script::default());
    let mut monitor = monitor(
        session(&dest, true, 10_000),
        launcher.clone(),
        true,
        Arc::new(SizeSampler::new()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = monitor.run(&mut RecordingSink::default(), cancel).await.unwrap();

    assert!(matches!(report, SessionReport::Interrupted { .. }));
    assert_eq!(report.cleanup(), &CleanupAction::Removed);
    assert_eq!(monitor.state(), SessionState::Interrupted);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    assert!(!dest.exists());
}

#[tokio::test]
async fn stale_log_from_an_earlier_run_is_not_reported() {
    let tmp = tempdir().unwrap();
    let dest = new_dest(tmp.path());
    let log_path = dest.join(DIAGNOSTIC_LOG_NAME);
    fs::write(&log_path, "[01:00:00] failed from last month\n").unwrap();

    let launcher = FakeLauncher::new(Script {
        files: vec![("DCIM/IMG_0002.jpg", 2048)],
        stderr: "pulled 1 file\n",
        ..Script::default()
    });
    let mut monitor = monitor(
        session(&dest, false, 10_000),
        launcher,
        true,
        Arc::new(SizeSampler::new()),
    );

    let report = monitor
        .run(&mut RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap();

    let SessionReport::Completed {
        outcome, marker, ..
    } = report
    else {
        panic!("expected completion");
    };
    assert!(outcome.success);
    assert!(!outcome.diagnostics_present);
    let marker = fs::read_to_string(marker.expect("marker path")).unwrap();
    assert!(!marker.contains(DIAGNOSTIC_LOG_NAME));
    assert_eq!(
        fs::read_to_string(&log_path).unwrap(),
        "[01:00:00] failed from last month\n"
    );
}
