pub mod blocks;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod vault;

// Re-export the main struct so hosts can just use `quill_core::EditorSession`
pub use session::{EditorSession, SessionEvent, SessionState};

// Re-export the simpler types for hosts
pub use blocks::{Block, Document, LinkRewrite, ListStyle, RawBlock};
pub use config::SessionConfig;
pub use engine::{EditingEngine, EngineFactory, EngineSignal};
pub use error::{BackupError, ConfigError, ConversionError, EngineError, SaveError};
pub use vault::{BackupRecord, BackupStore, EmergencyPayload};
