//! Engine launch, refresh and disposal.
//!
//! Every path that swaps the engine holds the `slot` lock for its whole
//! duration, so at most one instance is ever live and a second
//! initialization while one is live is a no-op.

use std::future;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::blocks::Document;
use crate::engine::{EditingEngine, EngineSignal, LaunchSeed};
use crate::error::{EngineError, SaveError};

use super::{lock, save, SessionEvent, SessionState, Shared};

pub(crate) struct EngineSlot {
    pub(crate) engine: Arc<dyn EditingEngine>,
    pub(crate) pump: JoinHandle<()>,
}

impl EngineSlot {
    /// Apply what the engine already reported, stop listening to it and tear
    /// it down. Teardown errors are logged and otherwise ignored.
    fn release(self, shared: &Shared) {
        shared.sync_signals();
        *lock(&shared.inbox) = None;
        self.pump.abort();
        if let Err(e) = self.engine.teardown() {
            warn!(session_id = %shared.id, op = "engine.teardown", error = %e, "engine teardown failed");
        }
    }
}

/// Where the initial document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    Initial,
    RollingBackup,
    Fallback,
    Empty,
}

impl SeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedSource::Initial => "initial",
            SeedSource::RollingBackup => "rolling-backup",
            SeedSource::Fallback => "fallback",
            SeedSource::Empty => "empty",
        }
    }
}

fn non_blank(markup: Option<&str>) -> Option<&str> {
    markup.filter(|m| !m.trim().is_empty())
}

/// Forward engine signals into the session until either side goes away.
/// The receiver stays in `Shared::inbox` so readers can drain it without
/// waiting for this task to be scheduled.
fn spawn_pump(session: Weak<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = future::poll_fn(|cx| match session.upgrade() {
                Some(shared) => shared.poll_signal(cx),
                None => Poll::Ready(None),
            })
            .await;
            let (Some(signal), Some(shared)) = (next, session.upgrade()) else {
                break;
            };
            shared.apply_signal(signal);
        }
    })
}

impl Shared {
    fn poll_signal(&self, cx: &mut Context<'_>) -> Poll<Option<EngineSignal>> {
        match lock(&self.inbox).as_mut() {
            Some(signals) => signals.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }

    fn apply_signal(&self, signal: EngineSignal) {
        match signal {
            EngineSignal::Edited => self.mark_dirty(),
            EngineSignal::Activity => self.record_activity(),
        }
    }

    /// Apply every signal the engine has queued but the pump has not yet
    /// picked up. Edits are visible to the dirty flag as soon as the engine
    /// reports them.
    pub(crate) fn sync_signals(&self) {
        loop {
            let next = match lock(&self.inbox).as_mut() {
                Some(signals) => signals.try_recv().ok(),
                None => None,
            };
            let Some(signal) = next else {
                break;
            };
            self.apply_signal(signal);
        }
    }

    /// Host content first, then this session's rolling backup, then the
    /// fallback, then an empty document.
    pub(crate) fn resolve_seed(&self) -> (Document, SeedSource) {
        if let Some(markup) = non_blank(self.config.initial_markup.as_deref()) {
            return (Document::from_markup(Some(markup)), SeedSource::Initial);
        }
        if let Some(markup) = self.store.load(&self.rolling_key) {
            if !markup.trim().is_empty() {
                return (
                    Document::from_markup(Some(&markup)),
                    SeedSource::RollingBackup,
                );
            }
        }
        if let Some(markup) = non_blank(self.config.fallback_markup.as_deref()) {
            return (Document::from_markup(Some(markup)), SeedSource::Fallback);
        }
        (Document::default(), SeedSource::Empty)
    }

    pub(crate) async fn initialize(self: &Arc<Self>) {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            debug!(session_id = %self.id, "engine already live; initialization skipped");
            return;
        }

        let (document, source) = self.resolve_seed();
        info!(
            session_id = %self.id,
            source = source.as_str(),
            blocks = document.len(),
            "seeding editing engine"
        );
        self.launch_into(&mut slot, document).await;
    }

    /// Launch a fresh engine seeded with `document` into an empty slot.
    /// Returns false if the launch failed or timed out; the session is then
    /// `TimedOut` and `document` is kept for the next attempt.
    async fn launch_into(
        self: &Arc<Self>,
        slot: &mut Option<EngineSlot>,
        document: Document,
    ) -> bool {
        self.set_state(SessionState::Initializing);

        let seed = LaunchSeed {
            blocks: document.to_raw(),
            placeholder: self.config.placeholder.clone(),
        };
        self.set_last_good(document);

        let (tx, rx) = mpsc::unbounded_channel();
        let limit = self.config.launch_timeout;
        let launched = match time::timeout(limit, self.factory.launch(seed, tx)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Launch(format!(
                "no first paint within {}ms",
                limit.as_millis()
            ))),
        };

        match launched {
            Ok(engine) => {
                *lock(&self.inbox) = Some(rx);
                let pump = spawn_pump(Arc::downgrade(self));
                *slot = Some(EngineSlot { engine, pump });
                self.clock.touch();
                self.drop_warning();
                self.set_state(SessionState::Ready);
                self.emit(SessionEvent::Ready);
                true
            }
            Err(e) => {
                error!(
                    session_id = %self.id,
                    op = "engine.launch",
                    at = %chrono::Utc::now(),
                    error = %e,
                    "engine launch failed"
                );
                self.set_state(SessionState::TimedOut);
                self.emit(SessionEvent::EngineFailed {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    pub(crate) async fn refresh(self: &Arc<Self>) -> SessionState {
        self.relaunch(true).await
    }

    /// Refresh after the engine stopped answering captures. Content comes
    /// straight from the snapshot instead of waiting on another capture.
    pub(crate) async fn recover(self: &Arc<Self>) -> SessionState {
        self.relaunch(false).await
    }

    async fn relaunch(self: &Arc<Self>, capture_first: bool) -> SessionState {
        let mut slot = self.slot.lock().await;
        if self.is_disposed() {
            warn!(session_id = %self.id, "refresh requested on a disposed session");
            return self.state();
        }

        let from = self.set_state(SessionState::Refreshing);
        info!(session_id = %self.id, from = %from, capture_first, "refreshing editing engine");

        let document = self.preserve_content(slot.as_ref(), capture_first).await;
        if let Some(old) = slot.take() {
            old.release(self);
        }

        if self.launch_into(&mut slot, document).await {
            self.emit(SessionEvent::Refreshed);
        }
        self.state()
    }

    /// Content to carry across a refresh: a bounded capture (when
    /// `capture_first`), else the engine's raw snapshot, else the last good
    /// document.
    async fn preserve_content(&self, slot: Option<&EngineSlot>, capture_first: bool) -> Document {
        let Some(slot) = slot else {
            return self.last_good();
        };

        if capture_first {
            let captured =
                save::capture_bounded(slot.engine.as_ref(), self.config.capture_timeout)
                    .await
                    .and_then(|raw| Document::from_raw(&raw).map_err(SaveError::from));
            match captured {
                Ok(document) => return document,
                Err(e) => {
                    warn!(session_id = %self.id, op = "refresh.capture", error = %e, "capture before refresh failed");
                }
            }
        }

        match Document::from_raw(&slot.engine.snapshot()) {
            Ok(document) if !document.is_blank() => document,
            Ok(_) => self.last_good(),
            Err(e) => {
                warn!(session_id = %self.id, op = "refresh.snapshot", error = %e, "engine snapshot unusable");
                self.last_good()
            }
        }
    }

    pub(crate) async fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        self.stop_timers();

        // Let an in-flight save finish before the engine goes away.
        let _gate = self.save_gate.lock().await;
        let mut slot = self.slot.lock().await;

        if let Some(live) = slot.take() {
            if self.is_dirty() {
                self.final_save(live.engine.as_ref()).await;
            }
            live.release(self);
        }
        info!(session_id = %self.id, "editing session disposed");
    }

    async fn final_save(&self, engine: &dyn EditingEngine) {
        let seq = self.edit_seq();
        let captured = save::capture_bounded(engine, self.config.capture_timeout)
            .await
            .and_then(|raw| Document::from_raw(&raw).map_err(SaveError::from));

        match captured {
            Ok(document) => {
                self.commit(document);
                self.mark_saved(seq);
            }
            Err(e) => {
                let key = self.write_emergency(&e, Some(engine));
                error!(
                    session_id = %self.id,
                    op = "dispose.save",
                    at = %chrono::Utc::now(),
                    error = %e,
                    emergency_key = ?key,
                    "final save on dispose failed"
                );
            }
        }
    }
}
