//! Browser-liveness monitor.
//!
//! Runs alongside the server, periodically checking the last heartbeat.
//! If the heartbeat goes stale for longer than `timeout`, asks the terminator
//! to stop the process. A heartbeat that was never recorded never goes stale,
//! so a slow browser start cannot shut the launcher down.
use crate::config::LifecycleConfig;
use crate::heartbeat::HeartbeatState;
use crate::signals::{ShutdownReason, Terminator};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Timings for the watchdog loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Wait before the first check.
    pub grace_period: Duration,
    /// Heartbeat age beyond which the browser is considered gone.
    pub timeout: Duration,
    /// Sleep between checks.
    pub poll_interval: Duration,
}

impl WatchdogConfig {
    pub fn from_lifecycle(config: &LifecycleConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self::from_lifecycle(&LifecycleConfig::default())
    }
}

/// Result of a single liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No heartbeat has ever been recorded.
    NeverSeen,
    /// Last heartbeat is within the timeout.
    Alive { age: Duration },
    /// Last heartbeat is older than the timeout.
    Stale { age: Duration },
}

/// How the watchdog loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogOutcome {
    /// Heartbeat age at the check that found it stale.
    pub elapsed: Duration,
    /// Number of checks performed, including the final one.
    pub checks: u32,
}

pub struct Watchdog {
    state: Arc<HeartbeatState>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(state: Arc<HeartbeatState>, config: WatchdogConfig) -> Self {
        Self { state, config }
    }

    /// Classify the heartbeat as of `now`.
    pub fn check(&self, now: Instant) -> Liveness {
        match self.state.age(now) {
            None => Liveness::NeverSeen,
            Some(age) if age > self.config.timeout => Liveness::Stale { age },
            Some(age) => Liveness::Alive { age },
        }
    }

    /// Sleep through the grace period, then poll until the heartbeat is stale.
    ///
    /// Only returns once a stale heartbeat is observed.
    pub async fn monitor(&self) -> WatchdogOutcome {
        debug!(
            grace_secs = self.config.grace_period.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            poll_secs = self.config.poll_interval.as_secs(),
            "watchdog started"
        );
        tokio::time::sleep(self.config.grace_period).await;

        let mut checks = 0u32;
        loop {
            checks = checks.saturating_add(1);
            match self.check(Instant::now()) {
                Liveness::Stale { age } => {
                    info!(
                        elapsed_secs = age.as_secs(),
                        "no heartbeat, browser tab closed"
                    );
                    return WatchdogOutcome {
                        elapsed: age,
                        checks,
                    };
                }
                Liveness::Alive { age } => {
                    debug!(age_ms = age.as_millis() as u64, "heartbeat ok");
                }
                Liveness::NeverSeen => {
                    debug!("no heartbeat recorded yet");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run the watchdog on its own task and terminate when it finishes.
    pub fn spawn(self, terminator: Arc<dyn Terminator>) -> JoinHandle<()> {
        let task = tokio::spawn(async move { self.monitor().await });
        tokio::spawn(supervise(task, terminator))
    }
}

/// Await the watchdog task and turn its end, normal or not, into termination.
///
/// A panicked watchdog would leave the process unmonitored forever, so it is
/// treated the same as a timeout. Cancellation means the runtime is already
/// shutting down.
pub async fn supervise(task: JoinHandle<WatchdogOutcome>, terminator: Arc<dyn Terminator>) {
    match task.await {
        Ok(outcome) => {
            debug!(checks = outcome.checks, "heartbeat watchdog finished");
            terminator.terminate(ShutdownReason::HeartbeatTimeout {
                elapsed: outcome.elapsed,
            });
        }
        Err(e) if e.is_panic() => {
            error!("heartbeat watchdog panicked: {e}");
            terminator.terminate(ShutdownReason::MonitorFailed);
        }
        Err(e) => debug!("heartbeat watchdog cancelled: {e}"),
    }
}
