//! Periodic save of unsaved content.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::{save, SessionState, Shared};

/// What one autosave tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing unsaved.
    Clean,
    /// Timed out, refreshing or still initializing. Autosave never
    /// brings a timed-out session back.
    NotReady,
    /// A save was already running.
    Busy,
    Saved,
    Failed,
}

pub(crate) fn spawn(shared: &Arc<Shared>) -> JoinHandle<()> {
    let session: Weak<Shared> = Arc::downgrade(shared);
    let period = shared.config.autosave_interval;

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
            let outcome = tick(&shared).await;
            debug!(session_id = %shared.id, ?outcome, "autosave tick");
        }
    })
}

pub(crate) async fn tick(shared: &Arc<Shared>) -> TickOutcome {
    if !shared.is_dirty() {
        return TickOutcome::Clean;
    }
    if shared.state() != SessionState::Ready {
        return TickOutcome::NotReady;
    }
    if shared.save_in_flight() {
        return TickOutcome::Busy;
    }
    if save::save_content(shared).await {
        TickOutcome::Saved
    } else {
        TickOutcome::Failed
    }
}
