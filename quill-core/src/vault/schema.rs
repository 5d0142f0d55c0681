/// quill-core/src/vault/schema.rs
/// The initial schema for the local backup vault.
pub const MIGRATION_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
    key TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    captured_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_captured_at ON backups(captured_at);
"#;
