//! The save protocol.
//!
//! At most one save runs at a time (`save_gate`). A save captures the
//! engine content under a timeout, converts it, commits it to the rolling
//! backup and the host callback, and only then clears the dirty flag.
//! Any failure after the capture started leaves an emergency backup behind,
//! and an engine that failed to deliver its content is relaunched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::blocks::{recover_paragraphs, Document, RawBlock};
use crate::engine::EditingEngine;
use crate::error::SaveError;
use crate::vault::EmergencyPayload;

use super::{SessionEvent, SessionState, Shared};

/// `capture` raced against `limit`. A capture that never resolves becomes
/// `SaveError::CaptureTimeout`.
pub(crate) async fn capture_bounded(
    engine: &dyn EditingEngine,
    limit: Duration,
) -> Result<Vec<RawBlock>, SaveError> {
    match time::timeout(limit, engine.capture()).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(SaveError::CaptureTimeout(limit)),
    }
}

pub(crate) async fn save_content(shared: &Arc<Shared>) -> bool {
    let Ok(_gate) = shared.save_gate.try_lock() else {
        debug!(session_id = %shared.id, error = %SaveError::InFlight, "save skipped");
        return false;
    };

    // Edits that land while the capture is pending stay dirty.
    let seq = shared.edit_seq();
    let started = Instant::now();

    match attempt(shared).await {
        Ok(markup) => {
            shared.mark_saved(seq);
            info!(
                session_id = %shared.id,
                bytes = markup.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "content saved"
            );
            true
        }
        Err((err, engine)) => {
            let emergency_key = if err.needs_recovery() {
                shared.write_emergency(&err, engine.as_deref())
            } else {
                None
            };
            warn!(
                session_id = %shared.id,
                op = "save",
                at = %Utc::now(),
                error = %err,
                emergency_key = ?emergency_key,
                "save failed"
            );
            shared.emit(SessionEvent::SaveFailed {
                reason: err.to_string(),
                emergency_key,
            });
            if err.engine_unresponsive() {
                shared.recover().await;
            }
            false
        }
    }
}

type Attempt = Result<String, (SaveError, Option<Arc<dyn EditingEngine>>)>;

async fn attempt(shared: &Arc<Shared>) -> Attempt {
    if shared.is_disposed() {
        return Err((SaveError::Disposed, None));
    }

    if shared.state() == SessionState::TimedOut {
        info!(session_id = %shared.id, "session timed out; refreshing before save");
        if shared.refresh().await == SessionState::TimedOut {
            return Err((SaveError::TimedOut, None));
        }
    }

    let state = shared.state();
    if state != SessionState::Ready {
        return Err((SaveError::NotReady(state), None));
    }
    let Some(engine) = shared.current_engine().await else {
        return Err((SaveError::NotReady(state), None));
    };

    let document = match capture_bounded(engine.as_ref(), shared.config.capture_timeout).await {
        Ok(raw) => Document::from_raw(&raw).map_err(SaveError::from),
        Err(e) => Err(e),
    };

    match document {
        Ok(document) => Ok(shared.commit(document)),
        Err(e) => Err((e, Some(engine))),
    }
}

impl Shared {
    /// Persist a captured document: rolling backup, host callback, activity,
    /// `Saved` event. Returns the committed markup.
    ///
    /// The activity clock is reset even if the session timed out while the
    /// capture was pending; the state itself stays `TimedOut`.
    pub(crate) fn commit(&self, document: Document) -> String {
        let markup = self.render(&document);
        if !self.store.save(&self.rolling_key, &markup) {
            warn!(session_id = %self.id, key = %self.rolling_key, "rolling backup not updated");
        }
        self.notify_change(&markup);
        self.clock.touch();
        self.clear_warning();
        self.set_last_good(document);
        self.emit(SessionEvent::Saved {
            markup: markup.clone(),
        });
        markup
    }

    /// Rescue whatever text the engine still holds into a new emergency
    /// record. Written even when nothing is recoverable so the failure
    /// itself is on record.
    pub(crate) fn write_emergency(
        &self,
        err: &SaveError,
        engine: Option<&dyn EditingEngine>,
    ) -> Option<String> {
        let raw = engine.map(|e| e.snapshot()).unwrap_or_default();
        let payload = EmergencyPayload {
            session_id: self.id,
            captured_at: Utc::now(),
            reason: err.to_string(),
            markup: recover_paragraphs(&raw),
        };

        let key = self.store.save_emergency(&payload);
        match &key {
            Some(key) => info!(session_id = %self.id, key = %key, bytes = payload.markup.len(), "emergency backup written"),
            None => error!(session_id = %self.id, "emergency backup could not be written"),
        }
        key
    }
}
