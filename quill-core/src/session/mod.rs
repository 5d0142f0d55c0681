//! The resilient editing session.
//!
//! One `EditorSession` per editing surface. It owns:
//! - the engine instance (through `lifecycle`)
//! - the activity clock + expiry monitor (`monitor`)
//! - the periodic autosave (`autosave`)
//! - the race-guarded save protocol (`save`)
//!
//! All mutable session state lives in `Shared`; the periodic tasks and the
//! engine signal pump hold only weak references to it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::blocks::Document;
use crate::config::SessionConfig;
use crate::engine::{EditingEngine, EngineFactory, EngineSignal};
use crate::error::ConfigError;
use crate::vault::BackupStore;

mod autosave;
mod lifecycle;
mod monitor;
mod save;

pub use autosave::TickOutcome;
pub use lifecycle::SeedSource;
pub use monitor::{assess, ActivityClock, Verdict};

use lifecycle::EngineSlot;

/// Host callback fired with the committed markup after every successful save.
pub type ChangeCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Initializing,
    Ready,
    Refreshing,
    TimedOut,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Refreshing => "refreshing",
            SessionState::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Notification side-channel to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An engine instance finished its first paint.
    Ready,
    Saved {
        markup: String,
    },
    /// One per failed save. `emergency_key` is set when partial content was
    /// rescued into the backup store.
    SaveFailed {
        reason: String,
        emergency_key: Option<String>,
    },
    /// Raised on every monitor check inside the warning window.
    ExpiringSoon {
        remaining: Duration,
    },
    ExpiryWarningCleared,
    TimedOut,
    Refreshed,
    EngineFailed {
        reason: String,
    },
}

// ════════════════════════════════════════════════════════════════════
// Shared state
// ════════════════════════════════════════════════════════════════════

pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) rolling_key: String,
    pub(crate) config: SessionConfig,
    pub(crate) factory: Arc<dyn EngineFactory>,
    pub(crate) store: BackupStore,
    pub(crate) clock: ActivityClock,
    on_change: ChangeCallback,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,

    // Dirty iff edit_seq != saved_seq.
    edit_seq: AtomicU64,
    saved_seq: AtomicU64,

    warned: AtomicBool,
    disposed: AtomicBool,

    /// Held for the whole of a save; `try_lock` failure means "in flight".
    pub(crate) save_gate: tokio::sync::Mutex<()>,
    /// The live engine. Held across launch/refresh/dispose.
    pub(crate) slot: tokio::sync::Mutex<Option<EngineSlot>>,
    /// Signals from the live engine. Drained by the pump and by readers.
    inbox: Mutex<Option<mpsc::UnboundedReceiver<EngineSignal>>>,
    /// Last document that was seeded or committed.
    last_good: Mutex<Document>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns the previous state.
    pub(crate) fn set_state(&self, next: SessionState) -> SessionState {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!(session_id = %self.id, from = %prev, to = %next, "session state changed");
        }
        prev
    }

    /// Move `from -> to` only if the session is still in `from`.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            info!(session_id = %self.id, from = %from, to = %to, "session state changed");
        }
        moved
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // The host may have dropped its receiver; events are advisory.
        let _ = self.events.send(event);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.sync_signals();
        self.edit_seq.load(Ordering::SeqCst) != self.saved_seq.load(Ordering::SeqCst)
    }

    pub(crate) fn edit_seq(&self) -> u64 {
        self.sync_signals();
        self.edit_seq.load(Ordering::SeqCst)
    }

    /// Everything up to and including edit `seq` is persisted.
    pub(crate) fn mark_saved(&self, seq: u64) {
        self.saved_seq.store(seq, Ordering::SeqCst);
    }

    pub(crate) fn mark_dirty(&self) {
        self.edit_seq.fetch_add(1, Ordering::SeqCst);
        self.record_activity();
    }

    /// Reset the activity clock. Ignored while timed out: only a refresh
    /// brings the session back.
    pub(crate) fn record_activity(&self) {
        if self.state() == SessionState::TimedOut {
            debug!(session_id = %self.id, "activity ignored while timed out");
            return;
        }
        self.clock.touch();
        self.clear_warning();
    }

    pub(crate) fn raise_warning(&self, remaining: Duration) {
        self.warned.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::ExpiringSoon { remaining });
    }

    pub(crate) fn clear_warning(&self) {
        if self.warned.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::ExpiryWarningCleared);
        }
    }

    pub(crate) fn drop_warning(&self) {
        self.warned.store(false, Ordering::SeqCst);
    }

    pub(crate) fn last_good(&self) -> Document {
        lock(&self.last_good).clone()
    }

    pub(crate) fn set_last_good(&self, document: Document) {
        *lock(&self.last_good) = document;
    }

    pub(crate) async fn current_engine(&self) -> Option<Arc<dyn EditingEngine>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|slot| slot.engine.clone())
    }

    pub(crate) fn save_in_flight(&self) -> bool {
        self.save_gate.try_lock().is_err()
    }

    /// Final markup: block codec output plus the configured link rewrite.
    pub(crate) fn render(&self, document: &Document) -> String {
        let markup = document.to_markup();
        match &self.config.link_rewrite {
            Some(rewrite) => rewrite.apply(&markup, &self.config.title),
            None => markup,
        }
    }

    pub(crate) fn notify_change(&self, markup: &str) {
        (self.on_change)(markup);
    }

    fn stop_timers(&self) {
        for timer in lock(&self.timers).drain(..) {
            timer.abort();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop_timers();
        if let Some(slot) = self.slot.get_mut().take() {
            slot.pump.abort();
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// EditorSession
// ════════════════════════════════════════════════════════════════════

/// Host-facing handle. Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct EditorSession {
    shared: Arc<Shared>,
}

impl fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorSession")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .field("dirty", &self.shared.is_dirty())
            .finish()
    }
}

impl EditorSession {
    /// Validate `config`, launch the first engine instance and start the
    /// monitor and autosave timers. Must be called inside a tokio runtime.
    ///
    /// An engine that fails to launch does not fail `open`: the session
    /// comes back `TimedOut` and recovers on the next refresh or save.
    pub async fn open<F>(
        config: SessionConfig,
        factory: Arc<dyn EngineFactory>,
        store: BackupStore,
        on_change: F,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), ConfigError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        config.validate()?;

        let id = config.session_id.unwrap_or_else(Uuid::new_v4);
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Initializing);

        let shared = Arc::new(Shared {
            id,
            rolling_key: BackupStore::rolling_key(&id),
            config,
            factory,
            store,
            clock: ActivityClock::new(),
            on_change: Box::new(on_change),
            events,
            state,
            edit_seq: AtomicU64::new(0),
            saved_seq: AtomicU64::new(0),
            warned: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            save_gate: tokio::sync::Mutex::new(()),
            slot: tokio::sync::Mutex::new(None),
            inbox: Mutex::new(None),
            last_good: Mutex::new(Document::default()),
            timers: Mutex::new(Vec::new()),
        });

        info!(session_id = %id, rolling_key = %shared.rolling_key, "editing session opening");
        shared.initialize().await;

        let timers = vec![monitor::spawn(&shared), autosave::spawn(&shared)];
        *lock(&shared.timers) = timers;

        Ok((Self { shared }, events_rx))
    }

    /// Persist the current content now. Never panics; `false` means the
    /// content is still unsaved and a `SaveFailed` event was sent (unless
    /// another save was already in flight).
    pub async fn save_content(&self) -> bool {
        save::save_content(&self.shared).await
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.shared.is_dirty()
    }

    /// Tear down and relaunch the engine, keeping its current content.
    /// Returns the state the session ended up in.
    pub async fn refresh(&self) -> SessionState {
        self.shared.refresh().await
    }

    /// Last content capture and persist, then release the engine and stop
    /// the timers. Idempotent.
    pub async fn dispose(&self) {
        self.shared.dispose().await;
    }

    /// For hosts that observe user interaction outside the engine.
    pub fn record_activity(&self) {
        self.shared.record_activity();
    }

    /// For hosts that observe edits outside the engine.
    pub fn mark_dirty(&self) {
        self.shared.mark_dirty();
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.id
    }

    pub fn rolling_key(&self) -> &str {
        &self.shared.rolling_key
    }

    /// Run one autosave tick now instead of waiting for the timer.
    pub async fn autosave_now(&self) -> TickOutcome {
        autosave::tick(&self.shared).await
    }

    /// Run one expiry check now. `None` while the session is `TimedOut`.
    pub fn check_expiry(&self) -> Option<Verdict> {
        monitor::check(&self.shared)
    }

    pub fn is_saving(&self) -> bool {
        self.shared.save_in_flight()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.shared.sync_signals();
        self.shared.clock.elapsed()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}
