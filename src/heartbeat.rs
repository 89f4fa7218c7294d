use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Last browser heartbeat, shared between the `/heartbeat` handler and the watchdog.
///
/// Holds a monotonic timestamp or nothing when no heartbeat has arrived yet.
/// Both reads and writes go through a single lock; the timestamp is taken
/// while holding it, so the stored value never moves backwards.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    last: Mutex<Option<Instant>>,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat at the current monotonic time and return it.
    pub fn record_heartbeat(&self) -> Instant {
        let mut last = self.lock();
        let now = Instant::now();
        *last = Some(now);
        now
    }

    /// The last recorded heartbeat, or `None` if none was ever recorded.
    pub fn read_heartbeat(&self) -> Option<Instant> {
        *self.lock()
    }

    /// Time elapsed between the last heartbeat and `now`.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.read_heartbeat()
            .map(|last| now.saturating_duration_since(last))
    }

    // A plain `Option<Instant>` can't be left half-written, so a poisoned
    // lock still holds a usable value.
    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
