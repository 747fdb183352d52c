mod backup;
mod cli;
mod context;
mod devices;
mod logging;
mod progress;

use clap::Parser;
use eyre::Result;

use crate::backup::run_backup;
use crate::cli::{Cli, Commands};
use crate::context::AppContext;
use crate::devices::{run_devices, run_folders};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if let Some(dir) = &cli.config_dir {
        archiver_core::config::set_config_dir(dir);
    }
    logging::init_logging(cli.verbose)?;
    let ctx = AppContext::load();

    match &cli.command {
        Commands::Backup(args) => run_backup(&ctx, args).await?,
        Commands::Devices(args) => run_devices(&ctx, args).await?,
        Commands::Folders(args) => run_folders(&ctx, args).await?,
    }

    Ok(())
}
