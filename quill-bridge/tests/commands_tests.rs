// quill-bridge/tests/commands_tests.rs
//
// Integration tests for the line-command parser and event formatting.

use quill_bridge::commands::{CommandParser, EditorCommand, HELP};
use quill_bridge::report::{describe, format_remaining};
use quill_core::{Block, ListStyle, SessionEvent};
use std::time::Duration;

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_blank_input_is_ignored() {
    assert_eq!(CommandParser::parse(""), None);
    assert_eq!(CommandParser::parse("   \t"), None);
}

#[test]
fn test_plain_text_is_paragraph() {
    assert_eq!(
        CommandParser::parse("  hello world  "),
        Some(EditorCommand::Write(Block::paragraph("hello world")))
    );
}

#[test]
fn test_control_commands() {
    assert_eq!(CommandParser::parse(":save"), Some(EditorCommand::Save));
    assert_eq!(CommandParser::parse(":w"), Some(EditorCommand::Save));
    assert_eq!(CommandParser::parse(":status"), Some(EditorCommand::Status));
    assert_eq!(CommandParser::parse(":refresh"), Some(EditorCommand::Refresh));
    assert_eq!(CommandParser::parse(":show"), Some(EditorCommand::Show));
    assert_eq!(CommandParser::parse(":backups"), Some(EditorCommand::Backups));
    assert_eq!(CommandParser::parse(":drop"), Some(EditorCommand::DropLast));
    assert_eq!(CommandParser::parse(":help"), Some(EditorCommand::Help));
    assert_eq!(CommandParser::parse(":q"), Some(EditorCommand::Quit));
}

#[test]
fn test_headers() {
    assert_eq!(
        CommandParser::parse(":h2 Chapter One"),
        Some(EditorCommand::Write(Block::header("Chapter One", 2)))
    );
    assert_eq!(
        CommandParser::parse(":h1 Top"),
        Some(EditorCommand::Write(Block::header("Top", 1)))
    );
}

#[test]
fn test_lists_split_on_pipe() {
    assert_eq!(
        CommandParser::parse(":ul eggs | milk |  | bread"),
        Some(EditorCommand::Write(Block::list(
            ListStyle::Unordered,
            ["eggs", "milk", "bread"]
        )))
    );
    assert_eq!(
        CommandParser::parse(":ol first|second"),
        Some(EditorCommand::Write(Block::list(
            ListStyle::Ordered,
            ["first", "second"]
        )))
    );
}

#[test]
fn test_quote_caption() {
    assert_eq!(
        CommandParser::parse(":quote Less is more -- Mies"),
        Some(EditorCommand::Write(Block::quote("Less is more", "Mies")))
    );
    assert_eq!(
        CommandParser::parse(":quote uncited"),
        Some(EditorCommand::Write(Block::quote("uncited", "")))
    );
}

#[test]
fn test_code_keeps_text() {
    assert_eq!(
        CommandParser::parse(":code let x = a < b;"),
        Some(EditorCommand::Write(Block::code("let x = a < b;")))
    );
}

#[test]
fn test_recover_needs_key() {
    assert_eq!(
        CommandParser::parse(":recover emergency:00000000000000000042"),
        Some(EditorCommand::Recover(
            "emergency:00000000000000000042".to_string()
        ))
    );
    assert_eq!(
        CommandParser::parse(":recover"),
        Some(EditorCommand::Unknown("recover".to_string()))
    );
}

#[test]
fn test_unknown_command() {
    assert_eq!(
        CommandParser::parse(":frobnicate now"),
        Some(EditorCommand::Unknown("frobnicate".to_string()))
    );
}

#[test]
fn test_help_lists_every_command() {
    let help = HELP.join("\n");
    for word in [":save", ":show", ":status", ":refresh", ":backups", ":recover", ":quit"] {
        assert!(help.contains(word), "help is missing {word}");
    }
}

// ============================================================================
// Event formatting
// ============================================================================

#[test]
fn test_format_remaining() {
    assert_eq!(format_remaining(Duration::from_secs(0)), "0s");
    assert_eq!(format_remaining(Duration::from_secs(45)), "45s");
    assert_eq!(format_remaining(Duration::from_secs(300)), "5m");
    assert_eq!(format_remaining(Duration::from_secs(90)), "1m 30s");
}

#[test]
fn test_describe_events() {
    assert_eq!(describe(&SessionEvent::Ready), "* editor ready");
    assert_eq!(
        describe(&SessionEvent::Saved {
            markup: "<p>hi</p>".into()
        }),
        "* saved (9 bytes)"
    );
    assert_eq!(
        describe(&SessionEvent::ExpiringSoon {
            remaining: Duration::from_secs(240)
        }),
        "! session expires in 4m without activity"
    );

    let failed = describe(&SessionEvent::SaveFailed {
        reason: "content capture timed out after 5s".into(),
        emergency_key: Some("emergency:1".into()),
    });
    assert!(failed.starts_with("! save failed"));
    assert!(failed.contains("emergency:1"));

    let plain = describe(&SessionEvent::SaveFailed {
        reason: "session has been disposed".into(),
        emergency_key: None,
    });
    assert_eq!(plain, "! save failed: session has been disposed");
}
