use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "archiver")]
#[command(about = "Back up an Android device over adb with live progress")]
#[command(after_help = "Run '<command> --help' for detailed options on each command.")]
pub struct Cli {
    /// Override the configuration directory for this invocation
    #[arg(long, global = true, value_name = "PATH")]
    pub config_dir: Option<PathBuf>,
    /// Enable debug logging (ARCHIVER_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull the device's shared storage (or one folder of it) into a local directory
    Backup(BackupArgs),
    /// List attached devices and their properties
    Devices(DevicesArgs),
    /// List top-level storage folders available for a partial backup
    Folders(FoldersArgs),
}

#[derive(Args, Clone, Debug)]
pub struct AdbArgs {
    /// adb binary to use instead of the configured or bundled one
    #[arg(long, value_name = "PATH")]
    pub adb: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct BackupArgs {
    /// Expected size of the data on the device, in GB (drives the percentage)
    #[arg(long, value_name = "GB")]
    pub estimate_gb: f64,
    /// Device serial (defaults to the only attached device)
    #[arg(long, value_name = "ID")]
    pub device: Option<String>,
    /// Back up a single top-level folder instead of all of storage
    #[arg(long, value_name = "NAME")]
    pub folder: Option<String>,
    /// Destination directory (defaults to backup_location from the config)
    #[arg(long, value_name = "PATH")]
    pub destination: Option<PathBuf>,
    /// Delete any existing content at the destination before copying
    #[arg(long)]
    pub fresh: bool,
    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
    #[command(flatten)]
    pub adb: AdbArgs,
}

#[derive(Args, Clone, Debug)]
pub struct DevicesArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub adb: AdbArgs,
}

#[derive(Args, Clone, Debug)]
pub struct FoldersArgs {
    /// Device serial
    #[arg(long, value_name = "ID")]
    pub device: String,
    #[command(flatten)]
    pub adb: AdbArgs,
}
