mod browser;
mod config;
mod data_dir;
mod heartbeat;
mod launcher;
mod serve;
mod signals;
mod version;
mod watchdog;

use clap::Parser;
use data_dir::DataDir;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Desktop launcher for Doors and Drawers: serve the app on localhost, open
/// it in the browser, and exit once the browser tab is closed.
#[derive(Parser, Debug)]
#[command(name = "doors-drawers", version, about)]
pub struct Cli {
    /// Config file path (default: launcher.toml in the data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (default: %LOCALAPPDATA%\DoorsAndDrawers or ~/DoorsAndDrawers)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Don't open the browser on startup
    #[arg(long)]
    no_browser: bool,

    /// Append logs to launcher.log in the data directory instead of stderr
    #[arg(long)]
    log_file: bool,

    /// Validate config and print resolved settings, don't serve
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (heartbeats, watchdog checks, requests)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn data_dir(&self) -> DataDir {
        match &self.data_dir {
            Some(path) => DataDir::new(path),
            None => DataDir::for_current_user(),
        }
    }

    /// Where logs go when `--log-file` is set. Known before the config loads,
    /// so startup failures land there too.
    fn log_path(&self) -> Option<PathBuf> {
        self.log_file.then(|| self.data_dir().log_file())
    }

    fn overrides(&self) -> launcher::Overrides {
        launcher::Overrides {
            data_dir: Some(self.data_dir().root().to_path_buf()),
            config: self.config.clone(),
            port: self.port,
            no_browser: self.no_browser,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_path().as_deref()) {
        eprintln!("error: failed to open log file: {e}");
        return ExitCode::FAILURE;
    }
    tracing::debug!(?cli, "parsed CLI arguments");

    let version = version::read_version(&version::base_dir());
    let settings = match launcher::Settings::resolve(&cli.overrides(), version) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("startup failed: {e}");
            if cli.log_file {
                eprintln!("error: {e}");
            }
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        println!("{}", launcher::describe(&settings));
        println!("Dry run mode — config validated, not serving.");
        return ExitCode::SUCCESS;
    }

    match launcher::run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("launcher failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Open `path` for appending, creating its directory first.
fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let default_filter = if verbose {
        "doors_drawers_launcher=debug,tower_http=debug"
    } else {
        "doors_drawers_launcher=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}
