//! Human-readable lines for session notifications.

use std::time::Duration;

use quill_core::SessionEvent;

pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Ready => "* editor ready".to_string(),
        SessionEvent::Saved { markup } => format!("* saved ({} bytes)", markup.len()),
        SessionEvent::SaveFailed {
            reason,
            emergency_key: Some(key),
        } => format!("! save failed: {reason} (partial content kept as {key})"),
        SessionEvent::SaveFailed {
            reason,
            emergency_key: None,
        } => format!("! save failed: {reason}"),
        SessionEvent::ExpiringSoon { remaining } => format!(
            "! session expires in {} without activity",
            format_remaining(*remaining)
        ),
        SessionEvent::ExpiryWarningCleared => "* expiry warning cleared".to_string(),
        SessionEvent::TimedOut => {
            "! session timed out; :refresh or :save to continue".to_string()
        }
        SessionEvent::Refreshed => "* editor refreshed".to_string(),
        SessionEvent::EngineFailed { reason } => format!("! editor failed to start: {reason}"),
    }
}
