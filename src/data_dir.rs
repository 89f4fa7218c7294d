use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name of the per-user application directory.
pub const APP_DIR_NAME: &str = "DoorsAndDrawers";

/// Manages the per-user data directory (e.g. `%LOCALAPPDATA%\DoorsAndDrawers`).
///
/// Holds the launcher config and the log file written when running without
/// a console.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Create a new DataDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data directory for the current user, from `LOCALAPPDATA` or the home directory.
    pub fn for_current_user() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from);
        Self::new(resolve_root(std::env::var_os("LOCALAPPDATA"), home))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the launcher config file.
    pub fn config(&self) -> PathBuf {
        self.root.join("launcher.toml")
    }

    /// Path to the launcher log file.
    pub fn log_file(&self) -> PathBuf {
        self.root.join("launcher.log")
    }

    const DEFAULT_CONFIG: &str = "\
# Doors and Drawers launcher configuration

[server]
bind = \"127.0.0.1\"
port = 8000

[lifecycle]
# Seconds without a browser heartbeat before the launcher exits.
timeout_secs = 10

[browser]
open = true
";

    /// Create the directory and write a default `launcher.toml` if missing.
    /// Returns Ok(true) if the directory was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;

        let config_path = self.config();
        if !config_path.exists() {
            std::fs::write(&config_path, Self::DEFAULT_CONFIG)?;
        }

        Ok(created)
    }
}

fn resolve_root(local_app_data: Option<OsString>, home: Option<PathBuf>) -> PathBuf {
    let base = local_app_data
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or(home)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR_NAME)
}
