//! Log output for the CLI. The core logs through the `log` facade; the
//! subscriber's `tracing-log` bridge picks those records up.

use eyre::{eyre, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "ARCHIVER_LOG";

/// Filter used when `ARCHIVER_LOG` is unset or unparsable.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,archiver=debug,archiver_core=debug"
    } else {
        "warn"
    }
}

pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .without_time(),
        )
        .try_init()
        .map_err(|err| eyre!("failed to initialise logging: {err}"))
}
