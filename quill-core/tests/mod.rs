use quill_core::blocks::{recover_paragraphs, to_blocks, to_markup, DEFAULT_SUBJECT_TEMPLATE};
use quill_core::vault::{EMERGENCY_PREFIX, ROLLING_PREFIX};
use quill_core::{
    BackupStore, Block, ConfigError, ConversionError, Document, EmergencyPayload, LinkRewrite,
    ListStyle, RawBlock, SessionConfig,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Markup -> Blocks
// ============================================================================

#[test]
fn test_empty_markup_yields_single_empty_paragraph() {
    assert_eq!(to_blocks(""), vec![Block::paragraph("")]);
    assert_eq!(to_blocks("   \n\t "), vec![Block::paragraph("")]);
    assert_eq!(Document::from_markup(None).blocks(), &[Block::paragraph("")]);
    assert_eq!(Document::from_markup(Some("")), Document::default());
}

#[test]
fn test_header_and_paragraph_scenario() {
    let markup = "<h2>Title</h2><p>Hello</p>";
    let blocks = to_blocks(markup);
    assert_eq!(
        blocks,
        vec![Block::header("Title", 2), Block::paragraph("Hello")]
    );
    assert_eq!(to_markup(&blocks), markup);
}

#[test]
fn test_unordered_list_scenario() {
    let markup = "<ul><li>A</li><li>B</li></ul>";
    let blocks = to_blocks(markup);
    assert_eq!(blocks, vec![Block::list(ListStyle::Unordered, ["A", "B"])]);
    assert_eq!(to_markup(&blocks), markup);
}

#[test]
fn test_ordered_list() {
    let blocks = to_blocks("<ol><li>first</li><li>second</li></ol>");
    assert_eq!(
        blocks,
        vec![Block::list(ListStyle::Ordered, ["first", "second"])]
    );
}

#[test]
fn test_quote_with_caption() {
    let markup = "<blockquote>Stay hungry<cite>Jobs</cite></blockquote>";
    let blocks = to_blocks(markup);
    assert_eq!(blocks, vec![Block::quote("Stay hungry", "Jobs")]);
    assert_eq!(to_markup(&blocks), markup);
}

#[test]
fn test_inline_cite_stays_in_quote_text() {
    let markup = "<blockquote>As <cite>Hamlet</cite> says, be</blockquote>";
    assert_eq!(
        to_blocks(markup),
        vec![Block::quote("As <cite>Hamlet</cite> says, be", "")]
    );

    let trailing = "<blockquote>As <cite>Hamlet</cite> says<cite>Polonius</cite> \n</blockquote>";
    assert_eq!(
        to_blocks(trailing),
        vec![Block::quote("As <cite>Hamlet</cite> says", "Polonius")]
    );
}

#[test]
fn test_quote_without_caption_omits_cite() {
    let markup = to_markup(&[Block::quote("Just words", "")]);
    assert_eq!(markup, "<blockquote>Just words</blockquote>");
}

#[test]
fn test_code_block_escapes_and_unescapes() {
    let block = Block::code("if a < b && c > d {}");
    let markup = to_markup(std::slice::from_ref(&block));
    assert_eq!(markup, "<pre>if a &lt; b &amp;&amp; c &gt; d {}</pre>");
    assert_eq!(to_blocks(&markup), vec![block]);
}

#[test]
fn test_code_block_strips_single_code_wrapper() {
    let blocks = to_blocks("<pre><code>let x = 1;</code></pre>");
    assert_eq!(blocks, vec![Block::code("let x = 1;")]);
}

#[test]
fn test_inline_markup_is_preserved_in_paragraph() {
    let markup = "<p>Some <b>bold</b> and <a href=\"https://x.test\">link</a></p>";
    let blocks = to_blocks(markup);
    assert_eq!(
        blocks,
        vec![Block::paragraph(
            "Some <b>bold</b> and <a href=\"https://x.test\">link</a>"
        )]
    );
    assert_eq!(to_markup(&blocks), markup);
}

#[test]
fn test_bare_text_and_inline_elements_become_one_paragraph() {
    let blocks = to_blocks("hello <em>there</em> friend<h1>Top</h1>");
    assert_eq!(
        blocks,
        vec![
            Block::paragraph("hello <em>there</em> friend"),
            Block::header("Top", 1),
        ]
    );
}

#[test]
fn test_unknown_elements_degrade_to_paragraph() {
    let blocks = to_blocks("<div>inside</div><h5>small</h5>");
    assert_eq!(
        blocks,
        vec![Block::paragraph("inside"), Block::paragraph("small")]
    );
}

#[test]
fn test_comments_and_block_voids_are_dropped() {
    let blocks = to_blocks("<!-- note --><p>kept</p><hr/>");
    assert_eq!(blocks, vec![Block::paragraph("kept")]);
}

#[test]
fn test_round_trip_law_for_every_kind() {
    let blocks = vec![
        Block::paragraph("plain <i>text</i>"),
        Block::header("One", 1),
        Block::header("Two", 2),
        Block::header("Three", 3),
        Block::list(ListStyle::Unordered, ["x", "y <b>z</b>"]),
        Block::list(ListStyle::Ordered, ["1", "2", "3"]),
        Block::quote("quoted", "someone"),
        Block::quote("uncited", ""),
        Block::quote("As <cite>Hamlet</cite> says, be", ""),
        Block::quote("As <cite>Hamlet</cite> says", "Polonius"),
        Block::code("fn main() { println!(\"<hi>\"); }"),
        Block::paragraph(""),
    ];
    let once = to_markup(&blocks);
    let twice = to_markup(&to_blocks(&once));
    assert_eq!(twice, once);
}

#[test]
fn test_header_level_is_clamped() {
    assert_eq!(Block::header("deep", 6), Block::header("deep", 3));
    assert_eq!(Block::header("zero", 0), Block::header("zero", 1));
}

// ============================================================================
// Raw engine data
// ============================================================================

#[test]
fn test_raw_block_conversion() {
    let raw = vec![
        RawBlock::new("paragraph", json!({ "text": "hi" })),
        RawBlock::new("header", json!({ "text": "h", "level": 2 })),
        RawBlock::new("list", json!({ "style": "ordered", "items": ["a", { "content": "b" }] })),
        RawBlock::new("quote", json!({ "text": "q", "caption": null })),
        RawBlock::new("code", json!({ "code": "x < y" })),
    ];
    let doc = Document::from_raw(&raw).unwrap();
    assert_eq!(
        doc.blocks(),
        &[
            Block::paragraph("hi"),
            Block::header("h", 2),
            Block::list(ListStyle::Ordered, ["a", "b"]),
            Block::quote("q", ""),
            Block::code("x < y"),
        ]
    );
    assert_eq!(doc.to_raw()[4].data, json!({ "code": "x < y" }));
}

#[test]
fn test_raw_block_defaults() {
    let raw = vec![
        RawBlock::new("header", json!({ "text": "t" })),
        RawBlock::new("list", json!({ "items": [] })),
    ];
    let doc = Document::from_raw(&raw).unwrap();
    assert_eq!(
        doc.blocks(),
        &[
            Block::header("t", 1),
            Block::list(ListStyle::Unordered, Vec::<String>::new()),
        ]
    );
}

#[test]
fn test_raw_block_conversion_errors() {
    let unknown = Document::from_raw(&[RawBlock::new("table", json!({}))]);
    assert_eq!(
        unknown,
        Err(ConversionError::UnknownKind("table".to_string()))
    );

    let missing = Document::from_raw(&[RawBlock::new("paragraph", json!({}))]);
    assert!(matches!(
        missing,
        Err(ConversionError::MissingField { field: "text", .. })
    ));

    let not_object = Document::from_raw(&[RawBlock::new("code", json!("text"))]);
    assert!(matches!(not_object, Err(ConversionError::NotAnObject { .. })));
}

#[test]
fn test_empty_raw_list_normalizes() {
    let doc = Document::from_raw(&[]).unwrap();
    assert!(doc.is_blank());
    assert_eq!(doc.len(), 1);
}

#[test]
fn test_raw_block_serialization_uses_type_key() {
    let raw = RawBlock::from(&Block::paragraph("x"));
    let value = serde_json::to_value(&raw).unwrap();
    assert_eq!(value, json!({ "type": "paragraph", "data": { "text": "x" } }));
}

#[test]
fn test_recover_paragraphs_keeps_text_fragments_only() {
    let raw = vec![
        RawBlock::new("paragraph", json!({ "text": "first" })),
        RawBlock::new("list", json!({ "items": ["lost"] })),
        RawBlock::new("header", json!({ "text": "second", "level": 9 })),
        RawBlock::new("paragraph", json!({ "text": "   " })),
        RawBlock::new("mystery", json!({ "text": "third" })),
    ];
    assert_eq!(
        recover_paragraphs(&raw),
        "<p>first</p><p>second</p><p>third</p>"
    );
    assert_eq!(recover_paragraphs(&[]), "");
}

// ============================================================================
// Link Rewrite
// ============================================================================

fn contact_rewrite() -> LinkRewrite {
    LinkRewrite::mailto("[contact us]", "Write to us", "team@example.org")
}

#[test]
fn test_link_rewrite_scenario() {
    let rewrite = contact_rewrite();
    let out = rewrite.apply("<p>Questions? [contact us]</p>", "Topic");

    assert_eq!(out.matches("mailto:").count(), 1);
    assert!(!out.contains("[contact us]"));
    let subject = urlencoding::encode("שאלה על Topic").into_owned();
    assert!(out.contains(&format!("mailto:team@example.org?subject={subject}")));
    assert!(out.contains(">Write to us</a>"));
}

#[test]
fn test_link_rewrite_is_idempotent() {
    let rewrite = contact_rewrite();
    let once = rewrite.apply("<p>[contact us]</p>", "Topic");
    let twice = rewrite.apply(&once, "Topic");
    assert_eq!(once, twice);
}

#[test]
fn test_link_rewrite_without_trigger_is_noop() {
    let markup = "<p>nothing to see</p>";
    assert_eq!(contact_rewrite().apply(markup, "Topic"), markup);
}

#[test]
fn test_link_rewrite_custom_subject_template() {
    let rewrite = contact_rewrite().with_subject_template("About: {title}");
    assert_eq!(rewrite.subject("Rust"), "About: Rust");
    assert_eq!(DEFAULT_SUBJECT_TEMPLATE.replace("{title}", "X"), "שאלה על X");
}

#[test]
fn test_link_rewrite_validation() {
    assert!(contact_rewrite().validate().is_ok());
    let looping = LinkRewrite::mailto("mail", "mail us", "a@b.c");
    assert!(matches!(looping.validate(), Err(ConfigError::LinkRewrite(_))));
    let empty = LinkRewrite::mailto("", "label", "a@b.c");
    assert!(empty.validate().is_err());
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = SessionConfig::default();
    assert_eq!(config.session_timeout, Duration::from_secs(30 * 60));
    assert_eq!(config.check_interval, Duration::from_secs(60));
    assert_eq!(config.warn_threshold, Duration::from_secs(5 * 60));
    assert_eq!(config.autosave_interval, Duration::from_secs(5 * 60));
    assert_eq!(config.capture_timeout, Duration::from_secs(5));
    assert_eq!(config.warn_after(), Duration::from_secs(25 * 60));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_from_json_millis() {
    let config = SessionConfig::from_json_str(
        r#"{ "session_timeout": 120000, "warn_threshold": 30000, "title": "Notes" }"#,
    )
    .unwrap();
    assert_eq!(config.session_timeout, Duration::from_secs(120));
    assert_eq!(config.warn_threshold, Duration::from_secs(30));
    assert_eq!(config.title, "Notes");
    assert_eq!(config.capture_timeout, Duration::from_secs(5));
}

#[test]
fn test_config_rejects_bad_values() {
    let zero = SessionConfig {
        capture_timeout: Duration::ZERO,
        ..SessionConfig::default()
    };
    assert_eq!(
        zero.validate(),
        Err(ConfigError::ZeroDuration("capture_timeout"))
    );

    let inverted = SessionConfig {
        warn_threshold: Duration::from_secs(60 * 60),
        ..SessionConfig::default()
    };
    assert!(matches!(
        inverted.validate(),
        Err(ConfigError::WarnThreshold { .. })
    ));

    assert!(matches!(
        SessionConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
}

// ============================================================================
// Backup Store
// ============================================================================

fn payload(markup: &str) -> EmergencyPayload {
    EmergencyPayload {
        session_id: Uuid::new_v4(),
        captured_at: chrono::Utc::now(),
        reason: "capture timed out".to_string(),
        markup: markup.to_string(),
    }
}

#[test]
fn test_store_save_and_load() {
    let store = BackupStore::open_in_memory().unwrap();
    let key = BackupStore::rolling_key(&Uuid::new_v4());
    assert!(key.starts_with(ROLLING_PREFIX));

    assert_eq!(store.load(&key), None);
    assert!(store.save(&key, "<p>one</p>"));
    assert!(store.save(&key, "<p>two</p>"));
    assert_eq!(store.load(&key).as_deref(), Some("<p>two</p>"));
    assert_eq!(store.list(ROLLING_PREFIX).len(), 1);
}

#[test]
fn test_store_refuses_to_overwrite_emergency_key() {
    let store = BackupStore::open_in_memory().unwrap();
    let key = store.save_emergency(&payload("<p>x</p>")).unwrap();
    assert!(!store.save(&key, "<p>clobber</p>"));
    assert_eq!(store.load_emergency(&key).unwrap().markup, "<p>x</p>");
}

#[test]
fn test_emergency_keys_are_unique() {
    let store = BackupStore::open_in_memory().unwrap();
    let first = store.save_emergency(&payload("<p>a</p>")).unwrap();
    let second = store.save_emergency(&payload("<p>b</p>")).unwrap();

    assert_ne!(first, second);
    assert!(first.starts_with(EMERGENCY_PREFIX));
    assert!(first < second);
    assert_eq!(store.load_emergency(&first).unwrap().markup, "<p>a</p>");
    assert_eq!(store.load_emergency(&second).unwrap().markup, "<p>b</p>");

    let listed: Vec<String> = store.list_emergency().into_iter().map(|r| r.key).collect();
    assert_eq!(listed, vec![first, second]);
}

#[test]
fn test_clones_share_records() {
    let store = BackupStore::open_in_memory().unwrap();
    let other = store.clone();
    store.save("rolling:shared", "<p>s</p>");
    assert_eq!(other.load("rolling:shared").as_deref(), Some("<p>s</p>"));
}

#[test]
fn test_reclaim() {
    let store = BackupStore::open_in_memory().unwrap();
    let key = store.save_emergency(&payload("")).unwrap();
    assert!(store.reclaim(&key));
    assert!(!store.reclaim(&key));
    assert!(store.list_emergency().is_empty());
}

#[test]
fn test_load_emergency_rejects_rolling_keys() {
    let store = BackupStore::open_in_memory().unwrap();
    store.save("rolling:x", "<p>x</p>");
    assert!(store.load_emergency("rolling:x").is_none());
}

#[test]
fn test_store_file_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backups.db");

    {
        let store = BackupStore::open(&path).unwrap();
        assert!(store.save("rolling:disk", "<p>kept</p>"));
    }

    let reopened = BackupStore::open(&path).unwrap();
    assert_eq!(reopened.load("rolling:disk").as_deref(), Some("<p>kept</p>"));
}

#[test]
fn test_store_failures_are_swallowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");
    let store = BackupStore::open(&path).unwrap();

    let saboteur = rusqlite::Connection::open(&path).unwrap();
    saboteur.execute_batch("DROP TABLE backups;").unwrap();

    assert!(!store.save("rolling:gone", "<p>x</p>"));
    assert_eq!(store.load("rolling:gone"), None);
    assert_eq!(store.save_emergency(&payload("<p>x</p>")), None);
    assert!(store.list_emergency().is_empty());
    assert!(!store.reclaim("rolling:gone"));
}
