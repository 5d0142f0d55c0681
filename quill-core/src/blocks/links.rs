//! Literal-phrase link rewrite, applied to final markup only.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `{title}` is replaced by the session title.
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "שאלה על {title}";

/// Replaces every exact occurrence of `trigger` with a `mailto:` anchor whose
/// subject line is built from the session title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRewrite {
    pub trigger: String,
    pub label: String,
    pub address: String,
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
}

fn default_subject_template() -> String {
    DEFAULT_SUBJECT_TEMPLATE.to_string()
}

impl LinkRewrite {
    pub fn mailto(
        trigger: impl Into<String>,
        label: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            label: label.into(),
            address: address.into(),
            subject_template: default_subject_template(),
        }
    }

    pub fn with_subject_template(mut self, template: impl Into<String>) -> Self {
        self.subject_template = template.into();
        self
    }

    /// The label must not reintroduce the trigger, otherwise a second pass
    /// would nest anchors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.is_empty() {
            return Err(ConfigError::LinkRewrite("trigger phrase is empty".into()));
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::LinkRewrite("mail address is empty".into()));
        }
        if self.label.contains(&self.trigger) {
            return Err(ConfigError::LinkRewrite(format!(
                "label `{}` contains the trigger phrase",
                self.label
            )));
        }
        Ok(())
    }

    pub fn subject(&self, title: &str) -> String {
        self.subject_template.replace("{title}", title)
    }

    pub fn anchor(&self, title: &str) -> String {
        format!(
            "<a href=\"mailto:{}?subject={}\">{}</a>",
            self.address,
            urlencoding::encode(&self.subject(title)),
            self.label
        )
    }

    /// Rewrite `markup`. A no-op when the trigger is absent, so applying it
    /// twice gives the same result as applying it once.
    pub fn apply(&self, markup: &str, title: &str) -> String {
        if self.trigger.is_empty() || !markup.contains(&self.trigger) {
            return markup.to_string();
        }

        let anchor = self.anchor(title);
        if anchor.contains(&self.trigger) {
            tracing::warn!(
                trigger = %self.trigger,
                "link rewrite skipped: anchor would contain its own trigger"
            );
            return markup.to_string();
        }
        markup.replace(&self.trigger, &anchor)
    }
}
