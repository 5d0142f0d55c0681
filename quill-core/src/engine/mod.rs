//! Capability interface over the interactive block editor.
//!
//! The session never touches a concrete editing surface. It launches one
//! through an `EngineFactory`, reads it through `EditingEngine`, and listens
//! to it through the `EngineSignal` channel handed over at launch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::blocks::RawBlock;
use crate::error::EngineError;

pub mod memory;

pub use memory::{MemoryEngine, MemoryEngineFactory};

/// What the editing surface tells the session about the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    /// Content changed.
    Edited,
    /// Pointer or keyboard interaction without a content change.
    Activity,
}

pub type SignalSender = mpsc::UnboundedSender<EngineSignal>;

/// Everything an engine needs for its first paint.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSeed {
    pub blocks: Vec<RawBlock>,
    pub placeholder: String,
}

/// A live editing surface.
#[async_trait]
pub trait EditingEngine: Send + Sync {
    /// Read the current content. May never resolve; callers race it
    /// against a timeout.
    async fn capture(&self) -> Result<Vec<RawBlock>, EngineError>;

    /// Whatever raw block data the engine still holds, without awaiting.
    /// Used for emergency extraction when `capture` has failed.
    fn snapshot(&self) -> Vec<RawBlock>;

    /// Release the surface. Called exactly once per instance.
    fn teardown(&self) -> Result<(), EngineError>;
}

/// Constructs engine instances. `launch` resolves once the engine has
/// painted for the first time (its "ready" callback).
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn launch(
        &self,
        seed: LaunchSeed,
        signals: SignalSender,
    ) -> Result<Arc<dyn EditingEngine>, EngineError>;
}
