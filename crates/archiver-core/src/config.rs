use directories::{BaseDirs, ProjectDirs};
use eyre::{eyre, Result, WrapErr};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "archiver.toml";

static CONFIG_DIR_OVERRIDE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Override the configuration directory for the current process.
/// Subsequent calls replace the previous override.
pub fn set_config_dir<P: AsRef<Path>>(path: P) {
    *CONFIG_DIR_OVERRIDE.write() = Some(path.as_ref().to_path_buf());
}

/// Resolve the configuration directory.
/// Priority: explicit override -> platform standard -> ~/.config/android-archiver
pub fn config_dir() -> Result<PathBuf> {
    if let Some(path) = CONFIG_DIR_OVERRIDE.read().clone() {
        return Ok(path);
    }

    if let Some(proj) = ProjectDirs::from("com", "AndroidArchiver", "android-archiver") {
        return Ok(proj.config_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".config").join("android-archiver"));
    }

    Err(eyre!(
        "unable to determine configuration directory (no override and no platform default)"
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Default destination for backups. A leading `~` is expanded.
    pub backup_location: PathBuf,
    /// Explicit adb binary; otherwise bundled platform-tools, then `PATH`.
    pub adb_path: Option<PathBuf>,
    /// Progress polling interval.
    pub tick_millis: u64,
    /// Upper bound for the source existence probe.
    pub probe_timeout_secs: u64,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        let backup_location = BaseDirs::new()
            .map(|base| base.home_dir().join("Documents").join("AndroidBackup"))
            .unwrap_or_else(|| PathBuf::from("AndroidBackup"));
        Self {
            backup_location,
            adb_path: None,
            tick_millis: 1000,
            probe_timeout_secs: 5,
        }
    }
}

impl ArchiverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config: ArchiverConfig =
            toml::from_str(&content).wrap_err("failed to parse config file")?;
        Ok(config.expanded())
    }

    /// Load `archiver.toml` from the config directory, writing the defaults
    /// there first if it does not exist yet. A config that cannot be written
    /// is not an error; the defaults are used for this run.
    pub fn load_or_init() -> Result<Self> {
        let dir = config_dir()?;
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Self::load(&path);
        }

        let config = Self::default();
        if let Err(err) = config.save(&path) {
            log::warn!("could not create config file: {err:#}");
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let text = toml::to_string(self).wrap_err("serialize config")?;
        fs::write(path, text)
            .wrap_err_with(|| format!("failed to write config file {}", path.display()))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(50))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    fn expanded(mut self) -> Self {
        self.backup_location = expand_home(&self.backup_location);
        if let Some(adb) = self.adb_path.take() {
            self.adb_path = Some(expand_home(&adb));
        }
        self
    }
}

pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the adb binary once, in priority order: explicit flag, config,
/// `platform-tools/` beside the executable, then whatever `PATH` provides.
pub fn resolve_adb_path(explicit: Option<&Path>, config: &ArchiverConfig) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = &config.adb_path {
        return path.clone();
    }
    let exe_name = if cfg!(windows) { "adb.exe" } else { "adb" };
    if let Some(bundled) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("platform-tools").join(exe_name)))
        .filter(|candidate| candidate.is_file())
    {
        return bundled;
    }
    PathBuf::from(exe_name)
}
