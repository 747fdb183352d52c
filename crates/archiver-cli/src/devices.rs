use archiver_core::adb::DeviceInfo;
use archiver_core::session::DEVICE_STORAGE_ROOT;
use eyre::{Result, WrapErr};
use owo_colors::OwoColorize;

use crate::cli::{DevicesArgs, FoldersArgs};
use crate::context::AppContext;

pub async fn run_devices(ctx: &AppContext, args: &DevicesArgs) -> Result<()> {
    let adb = ctx.adb(args.adb.adb.as_deref());
    let version = adb
        .version()
        .await
        .wrap_err_with(|| format!("adb at {} is not usable", adb.path().display()))?;
    log::info!("adb {version} at {}", adb.path().display());

    let serials = adb.devices().await?;
    let mut devices = Vec::with_capacity(serials.len());
    for serial in &serials {
        devices.push(adb.device_info(serial).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices attached. Check the USB cable and that USB debugging is enabled.");
        return Ok(());
    }

    println!(
        "{:<20} {:<14} {:<20} {:<8} BUILD",
        "SERIAL", "MANUFACTURER", "MODEL", "ANDROID"
    );
    for device in &devices {
        print_device(device);
    }
    Ok(())
}

fn print_device(device: &DeviceInfo) {
    println!(
        "{:<20} {:<14} {:<20} {:<8} {}",
        device.serial.bold(),
        device.manufacturer,
        device.model,
        device.android_version,
        device.build
    );
}

pub async fn run_folders(ctx: &AppContext, args: &FoldersArgs) -> Result<()> {
    let adb = ctx.adb(args.adb.adb.as_deref());
    adb.ensure_ready(&args.device).await?;
    let folders = adb
        .list_folders(&args.device, DEVICE_STORAGE_ROOT)
        .await
        .wrap_err_with(|| format!("failed to list {DEVICE_STORAGE_ROOT} on {}", args.device))?;

    if folders.is_empty() {
        println!("No folders found under {DEVICE_STORAGE_ROOT}.");
        return Ok(());
    }
    for folder in folders {
        println!("{folder}");
    }
    Ok(())
}
