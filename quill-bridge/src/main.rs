use std::sync::Arc;

use anyhow::Context;
use quill_bridge::commands::{CommandParser, EditorCommand, HELP};
use quill_bridge::{report, util};
use quill_core::engine::MemoryEngineFactory;
use quill_core::{BackupStore, Document, EditorSession, SessionConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    util::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading session config {path}"))?;
            SessionConfig::from_json_str(&json)
                .with_context(|| format!("parsing session config {path}"))?
        }
        None => SessionConfig::default(),
    };

    let store = util::open_store(util::default_store_path())?;
    let factory = Arc::new(MemoryEngineFactory::new());

    let (session, mut events) = EditorSession::open(
        config,
        factory.clone(),
        store.clone(),
        |markup: &str| info!(bytes = markup.len(), "host received committed content"),
    )
    .await?;

    eprintln!("=== Quill session {} ===", session.session_id());
    eprintln!("type :help for commands");

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", report::describe(&event));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let Some(command) = CommandParser::parse(&line) else {
            continue;
        };
        if !apply(&session, &factory, &store, command).await {
            break;
        }
    }

    session.dispose().await;
    printer.abort();
    Ok(())
}

/// Run one command. Returns false when the host should exit.
async fn apply(
    session: &EditorSession,
    factory: &MemoryEngineFactory,
    store: &BackupStore,
    command: EditorCommand,
) -> bool {
    match command {
        EditorCommand::Write(block) => match factory.current() {
            Some(engine) if !engine.is_torn_down() => engine.push(&block),
            _ => println!("! no live editor; try :refresh"),
        },
        EditorCommand::DropLast => {
            if let Some(engine) = factory.current() {
                let len = engine.blocks().len();
                if len == 0 || !engine.remove(len - 1) {
                    println!("! nothing to drop");
                }
            }
        }
        EditorCommand::Save => {
            if session.save_content().await {
                println!("saved");
            } else {
                println!("not saved; changes are kept");
            }
        }
        EditorCommand::Status => println!(
            "state: {}  unsaved: {}  idle: {}",
            session.state(),
            session.has_unsaved_changes(),
            report::format_remaining(session.idle_for())
        ),
        EditorCommand::Refresh => println!("state: {}", session.refresh().await),
        EditorCommand::Show => {
            let raw = factory.current().map(|e| e.blocks()).unwrap_or_default();
            match Document::from_raw(&raw) {
                Ok(document) => println!("{}", document.to_markup()),
                Err(e) => println!("! editor content is not convertible: {e}"),
            }
        }
        EditorCommand::Backups => {
            let records = store.list_emergency();
            if records.is_empty() {
                println!("no emergency backups");
            }
            for record in records {
                println!("{}  ({} bytes)", record.key, record.content.len());
            }
        }
        EditorCommand::Recover(key) => match store.load_emergency(&key) {
            Some(payload) => {
                println!("# {} at {}: {}", payload.session_id, payload.captured_at, payload.reason);
                println!("{}", payload.markup);
            }
            None => println!("! no emergency backup {key}"),
        },
        EditorCommand::Help => {
            for line in HELP {
                println!("{line}");
            }
        }
        EditorCommand::Quit => return false,
        EditorCommand::Unknown(word) => println!("! unknown command :{word} (try :help)"),
    }
    true
}
