use std::path::Path;

use archiver_core::adb::AdbTool;
use archiver_core::config::{resolve_adb_path, ArchiverConfig};

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ArchiverConfig,
}

impl AppContext {
    pub fn load() -> Self {
        let config = match ArchiverConfig::load_or_init() {
            Ok(config) => config,
            Err(err) => {
                eprintln!("[warn] failed to read configuration (using defaults): {err:?}");
                ArchiverConfig::default()
            }
        };
        Self { config }
    }

    /// adb handle for this invocation; `--adb` wins over the config.
    pub fn adb(&self, explicit: Option<&Path>) -> AdbTool {
        let path = resolve_adb_path(explicit, &self.config);
        log::debug!("using adb at {}", path.display());
        AdbTool::new(path).with_probe_timeout(self.config.probe_timeout())
    }
}
