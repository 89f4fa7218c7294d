//! Process termination and shutdown signal handling.
//!
//! The watchdog and the `/shutdown` endpoint never kill the process
//! themselves; they ask an injected [`Terminator`]. In production that is a
//! [`ProcessTerminator`], which raises SIGTERM against our own pid. The
//! server notices it through [`shutdown_signal`] and drains.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Why the process is being asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The browser stopped sending heartbeats.
    HeartbeatTimeout { elapsed: Duration },
    /// The page asked for shutdown via `POST /shutdown`.
    Requested,
    /// The watchdog itself failed; stop rather than run unmonitored.
    MonitorFailed,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::HeartbeatTimeout { elapsed } => {
                write!(f, "no heartbeat for {}s", elapsed.as_secs())
            }
            ShutdownReason::Requested => write!(f, "shutdown requested by browser"),
            ShutdownReason::MonitorFailed => write!(f, "heartbeat monitor failed"),
        }
    }
}

/// Requests termination of the enclosing process.
pub trait Terminator: Send + Sync + 'static {
    fn terminate(&self, reason: ShutdownReason);
}

/// Terminates the current process by signalling it.
///
/// Fires at most once; later requests are logged and ignored.
#[derive(Debug)]
pub struct ProcessTerminator {
    fired: AtomicBool,
    raise: fn(),
}

impl Default for ProcessTerminator {
    fn default() -> Self {
        Self {
            fired: AtomicBool::new(false),
            raise: raise_terminate,
        }
    }
}

impl ProcessTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `raise` instead of signalling the process.
    #[cfg(test)]
    fn with_raise(raise: fn()) -> Self {
        Self {
            fired: AtomicBool::new(false),
            raise,
        }
    }

    /// Whether termination has already been requested.
    #[cfg(test)]
    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Terminator for ProcessTerminator {
    fn terminate(&self, reason: ShutdownReason) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(%reason, "termination already in progress");
            return;
        }
        info!(%reason, "shutting down");
        (self.raise)();
    }
}

#[cfg(unix)]
fn raise_terminate() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::this(), Signal::SIGTERM) {
        error!("failed to signal self with SIGTERM: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn raise_terminate() {
    std::process::exit(0);
}

/// Resolves on SIGTERM or Ctrl-C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C"),
            Err(e) => {
                error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Exit the process if graceful shutdown hasn't finished within `deadline`.
///
/// Open browser connections can hold the server open; termination must win.
pub fn force_exit_after(deadline: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        warn!(
            deadline_secs = deadline.as_secs(),
            "graceful shutdown did not finish in time, exiting"
        );
        std::process::exit(0);
    });
}
