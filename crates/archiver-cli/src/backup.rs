use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archiver_core::adb::{AdbTool, RESTRICTED_FOLDER};
use archiver_core::cleanup::CleanupAction;
use archiver_core::config::expand_home;
use archiver_core::destination::{
    available_space, is_protected_location, prepare_destination, OnExisting, LOW_SPACE_THRESHOLD,
};
use archiver_core::errors::MonitorError;
use archiver_core::format::{format_bytes, format_hms, format_rate};
use archiver_core::monitor::{MonitorSettings, TransferMonitor, DEFAULT_BAR_WIDTH};
use archiver_core::sampler::{SizeSampler, DIAGNOSTIC_LOG_NAME};
use archiver_core::session::{SessionOutcome, SessionReport, TransferSession, DEVICE_STORAGE_ROOT};
use eyre::{bail, Result, WrapErr};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::cli::BackupArgs;
use crate::context::AppContext;
use crate::progress::IndicatifSink;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

fn confirm(message: &str, skip_prompt: bool) -> Result<bool> {
    if skip_prompt {
        return Ok(true);
    }

    print!("{} [y/N]: ", message);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let decision = input.trim().to_ascii_lowercase();
    Ok(decision == "y" || decision == "yes")
}

pub fn estimate_to_bytes(estimate_gb: f64) -> Result<u64> {
    if !estimate_gb.is_finite() || estimate_gb < 0.0 {
        bail!("--estimate-gb must be a non-negative number, got {estimate_gb}");
    }
    Ok((estimate_gb * BYTES_PER_GB) as u64)
}

/// Device path to pull: all of shared storage, or one top-level folder.
pub fn source_for(folder: Option<&str>) -> Result<String> {
    let Some(folder) = folder else {
        return Ok(DEVICE_STORAGE_ROOT.to_owned());
    };
    let folder = folder.trim_matches('/');
    if folder.is_empty() || folder.contains('/') || folder == "." || folder == ".." {
        bail!("--folder expects a single top-level folder name, got '{folder}'");
    }
    if folder == RESTRICTED_FOLDER {
        bail!("the {RESTRICTED_FOLDER} folder is not readable over adb");
    }
    Ok(format!("{DEVICE_STORAGE_ROOT}/{folder}"))
}

async fn resolve_device(adb: &AdbTool, requested: Option<&str>) -> Result<String> {
    if let Some(device) = requested {
        adb.ensure_ready(device).await?;
        return Ok(device.to_owned());
    }

    let devices = adb.devices().await?;
    match devices.as_slice() {
        [] => bail!("no Android device detected; connect one with USB debugging enabled"),
        [only] => {
            adb.ensure_ready(only).await?;
            Ok(only.clone())
        }
        many => bail!(
            "multiple devices attached ({}); choose one with --device",
            many.join(", ")
        ),
    }
}

fn count_entries(path: &Path) -> Result<usize> {
    if !path.is_dir() {
        return Ok(0);
    }
    Ok(fs::read_dir(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?
        .count())
}

fn check_free_space(destination: &Path, skip_prompt: bool) -> Result<()> {
    match available_space(destination) {
        Ok(free) if free < LOW_SPACE_THRESHOLD => {
            println!(
                "{}",
                format!(
                    "Warning: only {} free at {}",
                    format_bytes(free),
                    destination.display()
                )
                .yellow()
            );
            if !confirm("Continue anyway?", skip_prompt)? {
                bail!("backup cancelled: not enough free space");
            }
        }
        Ok(free) => log::debug!("{} free at {}", format_bytes(free), destination.display()),
        Err(err) => log::warn!("could not determine free space: {err:#}"),
    }
    Ok(())
}

pub async fn run_backup(ctx: &AppContext, args: &BackupArgs) -> Result<()> {
    let total_bytes = estimate_to_bytes(args.estimate_gb)?;
    let source = source_for(args.folder.as_deref())?;

    let adb = ctx.adb(args.adb.adb.as_deref());
    let version = adb
        .version()
        .await
        .wrap_err_with(|| format!("adb at {} is not usable", adb.path().display()))?;
    log::info!("adb {version}");
    let device = resolve_device(&adb, args.device.as_deref()).await?;
    let info = adb.device_info(&device).await;
    println!(
        "Device: {} {} (Android {}, {})",
        info.manufacturer,
        info.model,
        info.android_version,
        device.bold()
    );

    let destination: PathBuf = args
        .destination
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(|| ctx.config.backup_location.clone());
    if is_protected_location(&destination) {
        bail!(
            "refusing to back up into {}; choose a dedicated directory",
            destination.display()
        );
    }

    let existing = count_entries(&destination)?;
    let on_existing = if args.fresh {
        OnExisting::Fresh
    } else {
        OnExisting::Merge
    };
    if existing > 0 {
        let prompt = match on_existing {
            OnExisting::Fresh => format!(
                "{} contains {} entries. Delete them before the backup?",
                destination.display(),
                existing
            ),
            OnExisting::Merge => format!(
                "{} contains {} entries. Merge new files into it?",
                destination.display(),
                existing
            ),
        };
        if !confirm(&prompt, args.yes)? {
            bail!("backup cancelled; choose a different --destination");
        }
    }
    check_free_space(&destination, args.yes)?;

    let prepared = prepare_destination(&destination, on_existing)?;
    let session = TransferSession::new(&device, &source, &prepared.path, total_bytes)
        .excluding_restricted_subtree(args.folder.is_none())
        .with_created_directory(prepared.created);

    let adb = Arc::new(adb);
    let settings = MonitorSettings {
        tick: ctx.config.tick(),
        bar_width: DEFAULT_BAR_WIDTH,
    };
    let mut monitor = TransferMonitor::new(
        session,
        adb.clone(),
        adb,
        Arc::new(SizeSampler::new()),
    )
    .with_settings(settings);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    println!(
        "Copying {} -> {} (estimated {})",
        source,
        prepared.path.display(),
        format_bytes(total_bytes)
    );
    let mut sink = IndicatifSink::new(DEFAULT_BAR_WIDTH);
    let result = monitor.run(&mut sink, cancel).await;
    let session = monitor.session();

    match result {
        Ok(SessionReport::Completed {
            outcome,
            marker,
            cleanup,
        }) => {
            if outcome.success {
                print_success(session, &outcome, marker.as_deref());
                Ok(())
            } else {
                println!(
                    "\n{}",
                    "Backup failed - no files were transferred".red()
                );
                print_cleanup(&cleanup);
                bail!("no files were transferred from {}", session.source_path)
            }
        }
        Ok(SessionReport::Interrupted {
            bytes_transferred,
            file_count,
            elapsed,
            cleanup,
        }) => {
            println!("\n{}", "Backup interrupted by user.".yellow());
            println!(
                " - Copied before stopping: {} files ({}) in {}",
                file_count,
                format_bytes(bytes_transferred),
                format_hms(elapsed.as_secs_f64())
            );
            print_cleanup(&cleanup);
            bail!("backup interrupted")
        }
        Err(err @ MonitorError::SourceNotFound { .. }) => {
            println!("{}", format!("Error: {err}").red());
            Err(err).wrap_err("source verification failed")
        }
        Err(err) => {
            println!("{}", format!("Failed to start the copy: {err}").red());
            Err(err).wrap_err("backup could not start")
        }
    }
}

fn print_success(session: &TransferSession, outcome: &SessionOutcome, marker: Option<&Path>) {
    println!("\n{}", "Backup completed successfully!".green());
    if session.excludes_restricted_subtree {
        println!(
            "{}",
            "Note: Some protected files in the Android folder were skipped".yellow()
        );
    }
    let elapsed = outcome.elapsed.as_secs_f64();
    println!("Summary:");
    println!(
        " - Total files backed up: {} files ({})",
        outcome.file_count,
        format_bytes(outcome.bytes_transferred)
    );
    println!(" - Elapsed time: {}", format_hms(elapsed));
    if elapsed > 0.0 {
        println!(
            " - Average speed: {}/s",
            format_rate(outcome.bytes_transferred as f64 / elapsed)
        );
    }
    println!(" - Backup location: {}", session.destination().display());
    if outcome.is_partial_copy() {
        if let Some(code) = outcome.exit_code {
            println!(
                "{}",
                format!(" - adb exited with status {code}; some files may be missing").yellow()
            );
        }
    }
    if outcome.diagnostics_present {
        println!(
            "{}",
            format!(" - Some files were skipped - see {DIAGNOSTIC_LOG_NAME} for details").yellow()
        );
    }
    match marker {
        Some(path) => log::info!("completion marker written to {}", path.display()),
        None => println!("{}", "Warning: could not create completion file".yellow()),
    }
}

fn print_cleanup(cleanup: &CleanupAction) {
    match cleanup {
        CleanupAction::NotRequired => {}
        CleanupAction::Removed | CleanupAction::AlreadyGone => {
            println!("{}", cleanup.describe().green())
        }
        CleanupAction::Preserved => println!("{}", cleanup.describe().yellow()),
        CleanupAction::Failed(_) => println!("{}", cleanup.describe().red()),
    }
}
