//! Desktop launcher: resolve settings, boot the local server, and wire the
//! browser-liveness watchdog to process termination.
use crate::config::{ConfigError, LauncherConfig};
use crate::data_dir::DataDir;
use crate::heartbeat::HeartbeatState;
use crate::serve::{self, AppState};
use crate::signals::{ProcessTerminator, Terminator};
use crate::watchdog::{Watchdog, WatchdogConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the launcher needs after CLI and config file are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: DataDir,
    pub config_path: PathBuf,
    pub config: LauncherConfig,
    pub version: String,
}

/// CLI values that override the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub no_browser: bool,
}

#[derive(Debug)]
pub enum LaunchError {
    /// Failed to create the data directory or its default config.
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Config(ConfigError),
    /// Failed to build the async runtime.
    Runtime { source: std::io::Error },
    Serve(Box<dyn std::error::Error>),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::DataDir { path, source } => {
                write!(
                    f,
                    "failed to initialize data directory {}: {}",
                    path.display(),
                    source
                )
            }
            LaunchError::Config(e) => write!(f, "{}", e),
            LaunchError::Runtime { source } => {
                write!(f, "failed to start runtime: {}", source)
            }
            LaunchError::Serve(e) => write!(f, "server error: {}", e),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::DataDir { source, .. } => Some(source),
            LaunchError::Config(e) => Some(e),
            LaunchError::Runtime { source } => Some(source),
            LaunchError::Serve(e) => Some(e.as_ref()),
        }
    }
}

impl From<ConfigError> for LaunchError {
    fn from(e: ConfigError) -> Self {
        LaunchError::Config(e)
    }
}

impl Settings {
    /// Initialize the data directory, load the config file and apply overrides.
    pub fn resolve(overrides: &Overrides, version: String) -> Result<Self, LaunchError> {
        let data_dir = match &overrides.data_dir {
            Some(path) => DataDir::new(path),
            None => DataDir::for_current_user(),
        };
        data_dir.init().map_err(|source| LaunchError::DataDir {
            path: data_dir.root().to_path_buf(),
            source,
        })?;

        let config_path = overrides
            .config
            .clone()
            .unwrap_or_else(|| data_dir.config());
        let mut config = LauncherConfig::load(&config_path)?;
        if let Some(port) = overrides.port {
            config.server.port = port;
        }
        if overrides.no_browser {
            config.browser.open = false;
        }
        config.validate()?;

        Ok(Self {
            data_dir,
            config_path,
            config,
            version,
        })
    }
}

/// Build the request runtime and serve until the process is told to stop.
pub fn run(settings: &Settings) -> Result<(), LaunchError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.config.server.threads)
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;

    runtime.block_on(launch(settings))
}

async fn launch(settings: &Settings) -> Result<(), LaunchError> {
    let config = &settings.config;
    let url = config.server.url();

    tracing::info!(version = %settings.version, "Doors and Drawers launcher");
    tracing::info!(%url, data_dir = %settings.data_dir.root().display(), "starting server");
    tracing::info!("server will shut down automatically when the browser tab is closed");

    let heartbeat = Arc::new(HeartbeatState::new());
    let terminator: Arc<dyn Terminator> = Arc::new(ProcessTerminator::new());

    Watchdog::new(
        Arc::clone(&heartbeat),
        WatchdogConfig::from_lifecycle(&config.lifecycle),
    )
    .spawn(Arc::clone(&terminator));

    if config.browser.open {
        crate::browser::open_after(url, config.browser.delay());
    }

    let state = AppState::new(heartbeat, terminator, &config.lifecycle, &settings.version);
    serve::run(config, state).await.map_err(LaunchError::Serve)
}

/// Human-readable summary printed by `--dry-run`.
pub fn describe(settings: &Settings) -> String {
    let config = toml::to_string_pretty(&settings.config)
        .unwrap_or_else(|e| format!("# failed to render config: {e}\n"));
    format!(
        "Doors and Drawers launcher v{}\nData dir: {}\nConfig file: {}\nURL: {}\n\n{}",
        settings.version,
        settings.data_dir.root().display(),
        settings.config_path.display(),
        settings.config.server.url(),
        config
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides_in(dir: &std::path::Path) -> Overrides {
        Overrides {
            data_dir: Some(dir.join("DoorsAndDrawers")),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_resolve_initializes_data_dir_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(&overrides_in(tmp.path()), "1.0.0".into()).unwrap();

        assert!(settings.data_dir.root().is_dir());
        assert_eq!(settings.config_path, settings.data_dir.config());
        assert_eq!(settings.config, LauncherConfig::default());
    }

    #[test]
    fn test_cli_overrides_beat_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut overrides = overrides_in(tmp.path());
        let dd = DataDir::new(overrides.data_dir.clone().unwrap());
        std::fs::create_dir_all(dd.root()).unwrap();
        std::fs::write(dd.config(), "[server]\nport = 9000\n[browser]\nopen = true\n").unwrap();

        overrides.port = Some(9500);
        overrides.no_browser = true;
        let settings = Settings::resolve(&overrides, "1.0.0".into()).unwrap();

        assert_eq!(settings.config.server.port, 9500);
        assert!(!settings.config.browser.open);
    }

    #[test]
    fn test_explicit_config_path_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("custom.toml");
        std::fs::write(&custom, "[lifecycle]\ntimeout_secs = 45\n").unwrap();

        let mut overrides = overrides_in(tmp.path());
        overrides.config = Some(custom.clone());
        let settings = Settings::resolve(&overrides, "1.0.0".into()).unwrap();

        assert_eq!(settings.config_path, custom);
        assert_eq!(settings.config.lifecycle.timeout_secs, 45);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("bad.toml");
        std::fs::write(&custom, "[server]\nthreads = 0\n").unwrap();

        let mut overrides = overrides_in(tmp.path());
        overrides.config = Some(custom);
        let err = Settings::resolve(&overrides, "1.0.0".into()).unwrap_err();

        assert!(matches!(err, LaunchError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_describe_lists_resolved_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(&overrides_in(tmp.path()), "3.2.1".into()).unwrap();
        let text = describe(&settings);

        assert!(text.contains("v3.2.1"));
        assert!(text.contains("http://127.0.0.1:8000"));
        assert!(text.contains("[lifecycle]"));
    }
}
