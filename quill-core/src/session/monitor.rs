//! Inactivity tracking and the periodic expiry check.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{SessionEvent, SessionState, Shared};

/// Time of the most recent user activity. Never moves backwards.
#[derive(Debug)]
pub struct ActivityClock {
    last: Mutex<Instant>,
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record activity now and return the resulting timestamp.
    pub fn touch(&self) -> Instant {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if now > *last {
            *last = now;
        }
        *last
    }

    pub fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last())
    }
}

/// Result of one expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Active,
    ExpiringSoon { remaining: Duration },
    Expired,
}

/// Classify an idle period. The warning window is
/// `(timeout - warn_threshold, timeout]`; expiry is strictly past `timeout`.
pub fn assess(elapsed: Duration, timeout: Duration, warn_threshold: Duration) -> Verdict {
    if elapsed > timeout {
        Verdict::Expired
    } else if elapsed > timeout.saturating_sub(warn_threshold) {
        Verdict::ExpiringSoon {
            remaining: timeout - elapsed,
        }
    } else {
        Verdict::Active
    }
}

pub(crate) fn spawn(shared: &Arc<Shared>) -> JoinHandle<()> {
    let session: Weak<Shared> = Arc::downgrade(shared);
    let period = shared.config.check_interval;

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(shared) = session.upgrade() else {
                break;
            };
            if shared.is_disposed() {
                break;
            }
            check(&shared);
        }
    })
}

/// Run one expiry check. Returns `None` once the session is `TimedOut`.
///
/// Warnings are raised in every other state. Expiry only moves a `Ready`
/// session; while a launch is pending the lifecycle owns the state and
/// resets the clock when the engine comes up.
pub(crate) fn check(shared: &Shared) -> Option<Verdict> {
    if shared.state() == SessionState::TimedOut {
        return None;
    }
    shared.sync_signals();

    let idle = shared.clock.elapsed();
    let verdict = assess(
        idle,
        shared.config.session_timeout,
        shared.config.warn_threshold,
    );

    match verdict {
        Verdict::Expired => {
            if shared.transition(SessionState::Ready, SessionState::TimedOut) {
                warn!(
                    session_id = %shared.id,
                    idle_secs = idle.as_secs(),
                    "editing session timed out"
                );
                shared.drop_warning();
                shared.emit(SessionEvent::TimedOut);
            }
        }
        Verdict::ExpiringSoon { remaining } => {
            debug!(session_id = %shared.id, remaining_secs = remaining.as_secs(), "session expiring soon");
            shared.raise_warning(remaining);
        }
        Verdict::Active => shared.clear_warning(),
    }

    Some(verdict)
}
