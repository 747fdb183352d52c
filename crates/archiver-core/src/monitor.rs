//! Drives one backup session: verify the source, launch the copy, poll the
//! destination each tick, and arbitrate the outcome once the copy exits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cleanup::{CleanupAction, CleanupPolicy};
use crate::diagnostics::{diagnostics_grew, log_len, DiagnosticCollector};
use crate::errors::{MonitorError, MonitorResult};
use crate::format::{format_bytes, format_hms, format_rate, progress_percent, render_bar};
use crate::marker::CompletionMarker;
use crate::process::{CopyLauncher, CopyProcess, ExistenceProbe};
use crate::rate::RateEstimator;
use crate::sampler::{Sampler, SizeSnapshot, DIAGNOSTIC_LOG_NAME};
use crate::session::{
    ProgressSample, SessionOutcome, SessionReport, SessionState, TransferSession,
};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_BAR_WIDTH: usize = 30;
/// How long the collector may keep draining after the copy exits.
const DIAGNOSTIC_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub tick: Duration,
    pub bar_width: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

/// Everything the progress line shows for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStatus {
    pub percent: f64,
    pub bytes: u64,
    pub total: u64,
    pub file_count: u64,
    pub rate_bytes_per_sec: f64,
    pub eta_secs: f64,
}

impl ProgressStatus {
    /// `[bar] pct current/total (n files) [rate/s] ETA HH:MM:SS`
    pub fn render_line(&self, bar_width: usize) -> String {
        format!(
            "{} {}/{} ({} files) [{}/s] ETA {}",
            render_bar(self.percent, bar_width),
            format_bytes(self.bytes),
            format_bytes(self.total),
            self.file_count,
            format_rate(self.rate_bytes_per_sec),
            format_hms(self.eta_secs)
        )
    }
}

/// Receives one status per tick; implementations redraw in place.
pub trait ProgressSink: Send {
    fn render(&mut self, status: &ProgressStatus);
    /// Called once when the loop ends, before any final messages.
    fn finish(&mut self) {}
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn render(&mut self, _status: &ProgressStatus) {}
}

enum LoopExit {
    Exited(Option<i32>),
    Cancelled,
}

pub struct TransferMonitor {
    session: TransferSession,
    launcher: Arc<dyn CopyLauncher>,
    probe: Arc<dyn ExistenceProbe>,
    sampler: Arc<dyn Sampler>,
    cleanup: CleanupPolicy,
    settings: MonitorSettings,
    state: SessionState,
}

impl TransferMonitor {
    pub fn new(
        session: TransferSession,
        launcher: Arc<dyn CopyLauncher>,
        probe: Arc<dyn ExistenceProbe>,
        sampler: Arc<dyn Sampler>,
    ) -> Self {
        Self {
            session,
            launcher,
            probe,
            sampler,
            cleanup: CleanupPolicy::new(),
            settings: MonitorSettings::default(),
            state: SessionState::Verifying,
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the session to a terminal state.
    ///
    /// Verification and launch failures come back as errors after the
    /// destination has been through [`CleanupPolicy`]; every other ending is a
    /// [`SessionReport`].
    pub async fn run(
        &mut self,
        sink: &mut dyn ProgressSink,
        cancel: CancellationToken,
    ) -> MonitorResult<SessionReport> {
        self.transition(SessionState::Verifying);
        let device = self.session.device_id.clone();
        let source = self.session.source_path.clone();

        if !self.probe.exists(&device, &source).await {
            return Err(self.abort(MonitorError::SourceNotFound {
                device,
                path: source,
            }));
        }
        if cancel.is_cancelled() {
            log::info!("cancelled before the copy started");
            return Ok(self.interrupt(SizeSnapshot::default()));
        }

        let launched = self
            .launcher
            .launch(&device, &source, &self.session.destination)
            .await;
        let mut process = match launched {
            Ok(process) => process,
            Err(err) => return Err(self.abort(err)),
        };

        self.transition(SessionState::Running);
        let log_path = self.session.destination.join(DIAGNOSTIC_LOG_NAME);
        let log_baseline = log_len(&log_path);
        let collector_cancel = cancel.child_token();
        let collector = process.take_diagnostics().map(|stream| {
            DiagnosticCollector::new(&log_path).spawn(stream, collector_cancel.clone())
        });

        let exit = match self.poll_until_exit(&mut *process, sink, &cancel).await {
            // An operator interrupt usually kills the copy tool too; its exit
            // must not be judged as a completed run.
            LoopExit::Exited(_) if cancel.is_cancelled() => LoopExit::Cancelled,
            exit => exit,
        };
        sink.finish();

        match exit {
            LoopExit::Cancelled => {
                log::info!("cancellation requested; stopping copy");
                if let Err(err) = process.terminate().await {
                    log::warn!("failed to terminate copy process: {err}");
                }
                // The collector is abandoned; it stops on its own token.
                collector_cancel.cancel();
                let snapshot = self.measure().await;
                Ok(self.interrupt(snapshot))
            }
            LoopExit::Exited(exit_code) => {
                let written = match collector {
                    Some(handle) => match tokio::time::timeout(DIAGNOSTIC_GRACE, handle).await {
                        Ok(Ok(written)) => Some(written),
                        Ok(Err(err)) => {
                            log::debug!("diagnostic collector failed: {err}");
                            None
                        }
                        Err(_) => {
                            log::debug!("diagnostic collector still draining; abandoning it");
                            collector_cancel.cancel();
                            None
                        }
                    },
                    None => Some(0),
                };
                let diagnostics_present = match written {
                    Some(written) => written > 0,
                    None => diagnostics_grew(&log_path, log_baseline),
                };
                Ok(self.complete(exit_code, diagnostics_present).await)
            }
        }
    }

    fn interrupt(&mut self, snapshot: SizeSnapshot) -> SessionReport {
        let cleanup = self.cleanup.maybe_cleanup(&self.session, false);
        self.transition(SessionState::Interrupted);
        SessionReport::Interrupted {
            bytes_transferred: snapshot.total_bytes,
            file_count: snapshot.file_count,
            elapsed: self.session.started_at.elapsed(),
            cleanup,
        }
    }

    fn abort(&mut self, err: MonitorError) -> MonitorError {
        log::warn!("session aborted: {err}");
        let cleanup = self.cleanup.maybe_cleanup(&self.session, false);
        log::info!("{}", cleanup.describe());
        self.transition(SessionState::Aborted);
        err
    }

    async fn poll_until_exit(
        &self,
        process: &mut dyn CopyProcess,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> LoopExit {
        let tick = self.settings.tick;
        let mut rate = RateEstimator::new(
            self.session.started_at,
            self.session.total_estimated_bytes,
            tick,
        );
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let snapshot = self.measure().await;
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }
            let sample = ProgressSample {
                timestamp: Instant::now(),
                cumulative_bytes: snapshot.total_bytes,
                file_count: snapshot.file_count,
            };
            let update = rate.update(&sample);
            log::debug!(
                "tick: {} bytes, {} files, {:.0} B/s",
                sample.cumulative_bytes,
                sample.file_count,
                update.rate_bytes_per_sec
            );
            sink.render(&ProgressStatus {
                percent: progress_percent(
                    sample.cumulative_bytes,
                    self.session.total_estimated_bytes,
                ),
                bytes: sample.cumulative_bytes,
                total: self.session.total_estimated_bytes,
                file_count: sample.file_count,
                rate_bytes_per_sec: update.rate_bytes_per_sec,
                eta_secs: update.eta_secs,
            });

            match process.try_finished() {
                Ok(Some(code)) => return LoopExit::Exited(code),
                Ok(None) => {}
                Err(err) => {
                    log::warn!("unable to query copy process state: {err}");
                    return LoopExit::Exited(None);
                }
            }
        }
    }

    /// Sample the destination on the blocking pool.
    async fn measure(&self) -> SizeSnapshot {
        let sampler = Arc::clone(&self.sampler);
        let root = self.session.destination.clone();
        let since = self.session.start_time;
        match tokio::task::spawn_blocking(move || sampler.sample(&root, since)).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("sampling task failed: {err}");
                SizeSnapshot::default()
            }
        }
    }

    async fn complete(
        &mut self,
        exit_code: Option<i32>,
        diagnostics_present: bool,
    ) -> SessionReport {
        // Taken strictly after the process is gone so late writes are counted.
        let snapshot = self.measure().await;
        let outcome = SessionOutcome::judge(
            snapshot.total_bytes,
            snapshot.file_count,
            self.session.started_at.elapsed(),
            diagnostics_present,
            exit_code,
        );

        if outcome.is_partial_copy() {
            log::info!(
                "{}",
                MonitorError::PartialCopy {
                    bytes: outcome.bytes_transferred,
                    exit_code,
                }
            );
        }

        let (marker, cleanup) = if outcome.success {
            let marker = match CompletionMarker::from_outcome(&self.session, &outcome)
                .write(&self.session.destination)
            {
                Ok(path) => Some(path),
                Err(err) => {
                    log::warn!("could not create completion file: {err:#}");
                    None
                }
            };
            (marker, CleanupAction::NotRequired)
        } else {
            (None, self.cleanup.maybe_cleanup(&self.session, false))
        };

        self.transition(SessionState::Completed);
        SessionReport::Completed {
            outcome,
            marker,
            cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_matches_operator_format() {
        let status = ProgressStatus {
            percent: 50.0,
            bytes: 5 * 1024 * 1024,
            total: 10 * 1024 * 1024,
            file_count: 12,
            rate_bytes_per_sec: 1024.0 * 1024.0,
            eta_secs: 5.0,
        };
        assert_eq!(
            status.render_line(10),
            "[█████░░░░░] 50.0% 5.00 MiB/10.00 MiB (12 files) [1.00 MiB/s] ETA 00:00:05"
        );
    }

    #[test]
    fn negative_eta_renders_as_zero() {
        let status = ProgressStatus {
            percent: 100.0,
            bytes: 20,
            total: 10,
            file_count: 1,
            rate_bytes_per_sec: 5.0,
            eta_secs: -2.0,
        };
        assert!(status.render_line(4).ends_with("ETA 00:00:00"));
    }
}
