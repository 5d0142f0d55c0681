//! Error taxonomy for the editing session.
//!
//! None of these cross the `EditorSession` boundary: the host only ever sees
//! the boolean from `save_content()` and the `SessionEvent` side-channel.

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Failures reported by an editing engine implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine failed to launch: {0}")]
    Launch(String),
    #[error("engine failed to capture content: {0}")]
    Capture(String),
    #[error("engine teardown failed: {0}")]
    Teardown(String),
}

/// Raw engine data that does not map onto one of the five block kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unknown block kind `{0}`")]
    UnknownKind(String),
    #[error("`{kind}` block data is not an object")]
    NotAnObject { kind: String },
    #[error("`{kind}` block is missing field `{field}`")]
    MissingField { kind: String, field: &'static str },
    #[error("`{kind}` block has an invalid `{field}` field")]
    InvalidField { kind: String, field: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("a save is already in flight")]
    InFlight,
    #[error("session has been disposed")]
    Disposed,
    #[error("session timed out and refresh did not recover it")]
    TimedOut,
    #[error("session is not ready (state: {0})")]
    NotReady(SessionState),
    #[error("content capture timed out after {0:?}")]
    CaptureTimeout(Duration),
    #[error(transparent)]
    Capture(#[from] EngineError),
    #[error("block conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl SaveError {
    /// Whether the failure happened after the session was eligible to save,
    /// i.e. the engine was asked for content and could not deliver it.
    /// Only these failures trigger emergency extraction.
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            SaveError::CaptureTimeout(_) | SaveError::Capture(_) | SaveError::Conversion(_)
        )
    }

    /// The engine itself failed to answer. The session relaunches it from its
    /// snapshot. Conversion failures keep the engine, whose content is still
    /// the user's only full copy.
    pub fn engine_unresponsive(&self) -> bool {
        matches!(self, SaveError::CaptureTimeout(_) | SaveError::Capture(_))
    }
}

/// Local backup medium failures. Swallowed by `BackupStore`'s public API.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup storage error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("backup encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("emergency key collision after {0} attempts")]
    KeyCollision(u32),
    #[error("refusing to overwrite emergency backup `{0}`")]
    ProtectedKey(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("warn threshold ({warn:?}) must be shorter than the session timeout ({timeout:?})")]
    WarnThreshold { warn: Duration, timeout: Duration },
    #[error("invalid link rewrite: {0}")]
    LinkRewrite(String),
    #[error("could not parse config: {0}")]
    Parse(String),
}
