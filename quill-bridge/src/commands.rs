use quill_core::{Block, ListStyle};

/// One line of host input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCommand {
    /// Append a block to the live document.
    Write(Block),
    /// Remove the last block.
    DropLast,
    Save,
    Status,
    Refresh,
    Show,
    Backups,
    Recover(String),
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &[&str] = &[
    "plain text        append a paragraph",
    ":h1 / :h2 / :h3   append a header",
    ":ul a | b | c     append an unordered list (:ol for ordered)",
    ":quote text -- by append a quote with an optional caption",
    ":code text        append a code block",
    ":drop             remove the last block",
    ":save  (:w)       save now",
    ":show             print the current markup",
    ":status           session state and unsaved flag",
    ":refresh          relaunch the editor, keeping content",
    ":backups          list emergency backups",
    ":recover KEY      print an emergency backup",
    ":quit  (:q)       save if needed and exit",
];

pub struct CommandParser;

impl CommandParser {
    /// `None` for blank input. Lines starting with `:` are commands;
    /// anything else is a paragraph.
    pub fn parse(input: &str) -> Option<EditorCommand> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(body) = trimmed.strip_prefix(':') else {
            return Some(EditorCommand::Write(Block::paragraph(trimmed)));
        };

        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (body, ""),
        };

        let command = match word {
            "save" | "w" => EditorCommand::Save,
            "status" => EditorCommand::Status,
            "refresh" => EditorCommand::Refresh,
            "show" | "print" => EditorCommand::Show,
            "backups" => EditorCommand::Backups,
            "drop" => EditorCommand::DropLast,
            "help" | "?" => EditorCommand::Help,
            "quit" | "q" => EditorCommand::Quit,
            "recover" if !rest.is_empty() => EditorCommand::Recover(rest.to_string()),
            "p" => EditorCommand::Write(Block::paragraph(rest)),
            "h1" => EditorCommand::Write(Block::header(rest, 1)),
            "h2" => EditorCommand::Write(Block::header(rest, 2)),
            "h3" => EditorCommand::Write(Block::header(rest, 3)),
            "ul" => EditorCommand::Write(list(ListStyle::Unordered, rest)),
            "ol" => EditorCommand::Write(list(ListStyle::Ordered, rest)),
            "quote" => EditorCommand::Write(quote(rest)),
            "code" => EditorCommand::Write(Block::code(rest)),
            other => EditorCommand::Unknown(other.to_string()),
        };
        Some(command)
    }
}

fn list(style: ListStyle, rest: &str) -> Block {
    let items = rest
        .split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty());
    Block::list(style, items)
}

fn quote(rest: &str) -> Block {
    match rest.split_once(" -- ") {
        Some((text, caption)) => Block::quote(text.trim(), caption.trim()),
        None => Block::quote(rest, ""),
    }
}
