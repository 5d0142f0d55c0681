//! In-process engine for hosts without an interactive surface.
//!
//! The bridge binary drives it from stdin; tests drive it directly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::blocks::{Block, RawBlock};
use crate::error::EngineError;

use super::{EditingEngine, EngineFactory, EngineSignal, LaunchSeed, SignalSender};

#[derive(Debug)]
pub struct MemoryEngine {
    blocks: Mutex<Vec<RawBlock>>,
    placeholder: String,
    signals: SignalSender,
    torn_down: AtomicBool,
}

impl MemoryEngine {
    pub fn new(seed: LaunchSeed, signals: SignalSender) -> Self {
        Self {
            blocks: Mutex::new(seed.blocks),
            placeholder: seed.placeholder,
            signals,
            torn_down: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RawBlock>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, signal: EngineSignal) {
        // The session may already have dropped its receiver during refresh.
        let _ = self.signals.send(signal);
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn blocks(&self) -> Vec<RawBlock> {
        self.lock().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Append a block. A lone blank paragraph (the empty document) is
    /// replaced rather than kept in front of it.
    pub fn push(&self, block: &Block) {
        {
            let mut blocks = self.lock();
            let blank = matches!(blocks.as_slice(), [only] if only.kind == "paragraph"
                && only.text().is_some_and(|t| t.trim().is_empty()));
            if blank {
                blocks.clear();
            }
            blocks.push(RawBlock::from(block));
        }
        self.signal(EngineSignal::Edited);
    }

    /// Insert engine-native data as-is, bypassing the typed model.
    pub fn push_raw(&self, raw: RawBlock) {
        self.lock().push(raw);
        self.signal(EngineSignal::Edited);
    }

    pub fn replace(&self, index: usize, block: &Block) -> bool {
        let replaced = match self.lock().get_mut(index) {
            Some(slot) => {
                *slot = RawBlock::from(block);
                true
            }
            None => false,
        };
        if replaced {
            self.signal(EngineSignal::Edited);
        }
        replaced
    }

    pub fn remove(&self, index: usize) -> bool {
        let removed = {
            let mut blocks = self.lock();
            if index < blocks.len() {
                blocks.remove(index);
                true
            } else {
                false
            }
        };
        if removed {
            self.signal(EngineSignal::Edited);
        }
        removed
    }

    /// Cursor movement, clicks and other interaction that edits nothing.
    pub fn touch(&self) {
        self.signal(EngineSignal::Activity);
    }
}

#[async_trait]
impl EditingEngine for MemoryEngine {
    async fn capture(&self) -> Result<Vec<RawBlock>, EngineError> {
        if self.is_torn_down() {
            return Err(EngineError::Capture("engine has been torn down".into()));
        }
        Ok(self.blocks())
    }

    fn snapshot(&self) -> Vec<RawBlock> {
        self.blocks()
    }

    fn teardown(&self) -> Result<(), EngineError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Teardown("already torn down".into()));
        }
        Ok(())
    }
}

/// Launches `MemoryEngine`s and remembers the live one so the host can
/// edit it.
#[derive(Debug, Default)]
pub struct MemoryEngineFactory {
    current: Mutex<Option<Arc<MemoryEngine>>>,
    launches: AtomicUsize,
}

impl MemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<MemoryEngine>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for MemoryEngineFactory {
    async fn launch(
        &self,
        seed: LaunchSeed,
        signals: SignalSender,
    ) -> Result<Arc<dyn EditingEngine>, EngineError> {
        let engine = Arc::new(MemoryEngine::new(seed, signals));
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(engine.clone());
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(engine)
    }
}
