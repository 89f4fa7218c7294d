use std::path::{Path, PathBuf};

pub const UNKNOWN: &str = "unknown";

/// Directory holding bundled resources: next to the executable.
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Read the application version from `VERSION` in `base`, or "unknown".
pub fn read_version(base: &Path) -> String {
    match std::fs::read_to_string(base.join("VERSION")) {
        Ok(contents) => {
            let version = contents.trim();
            if version.is_empty() {
                UNKNOWN.to_string()
            } else {
                version.to_string()
            }
        }
        Err(e) => {
            tracing::debug!("no VERSION file in {}: {e}", base.display());
            UNKNOWN.to_string()
        }
    }
}
