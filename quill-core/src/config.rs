//! Session configuration.
//!
//! Every field is optional in JSON; durations are written in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blocks::LinkRewrite;
use crate::error::ConfigError;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WARN_THRESHOLD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PLACEHOLDER: &str = "Start writing here…";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Explicit seed content. Wins over the local backup.
    pub initial_markup: Option<String>,
    /// Seed used when there is neither explicit content nor a backup.
    pub fallback_markup: Option<String>,
    /// Shown by the engine while the document is blank.
    pub placeholder: String,
    /// Only used by the link rewrite.
    pub title: String,
    pub link_rewrite: Option<LinkRewrite>,
    /// Reuse a prior instance's id (and therefore its rolling backup).
    pub session_id: Option<Uuid>,

    #[serde(with = "millis")]
    pub session_timeout: Duration,
    #[serde(with = "millis")]
    pub check_interval: Duration,
    #[serde(with = "millis")]
    pub warn_threshold: Duration,
    #[serde(with = "millis")]
    pub autosave_interval: Duration,
    #[serde(with = "millis")]
    pub capture_timeout: Duration,
    #[serde(with = "millis")]
    pub launch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_markup: None,
            fallback_markup: None,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            title: String::new(),
            link_rewrite: None,
            session_id: None,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("session_timeout", self.session_timeout),
            ("check_interval", self.check_interval),
            ("autosave_interval", self.autosave_interval),
            ("capture_timeout", self.capture_timeout),
            ("launch_timeout", self.launch_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(field));
            }
        }

        if self.warn_threshold >= self.session_timeout {
            return Err(ConfigError::WarnThreshold {
                warn: self.warn_threshold,
                timeout: self.session_timeout,
            });
        }

        if let Some(rewrite) = &self.link_rewrite {
            rewrite.validate()?;
        }
        Ok(())
    }

    /// Elapsed inactivity after which the expiry warning is raised.
    pub fn warn_after(&self) -> Duration {
        self.session_timeout.saturating_sub(self.warn_threshold)
    }

    pub fn with_initial_markup(mut self, markup: impl Into<String>) -> Self {
        self.initial_markup = Some(markup.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_link_rewrite(mut self, rewrite: LinkRewrite) -> Self {
        self.link_rewrite = Some(rewrite);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
