use std::path::PathBuf;

use directories::ProjectDirs;
use quill_core::{BackupError, BackupStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    // RUST_LOG=quill_core=debug,quill_bridge=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .compact()
        .try_init();
}

/// `<data dir>/backups.db`, e.g. `~/.local/share/quill/backups.db`.
pub fn default_store_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "DrTomLLC", "Quill").map(|dirs| dirs.data_dir().join("backups.db"))
}

/// Open the on-disk backup store, falling back to an in-memory one when the
/// data directory is unavailable.
pub fn open_store(path: Option<PathBuf>) -> Result<BackupStore, BackupError> {
    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "could not create data directory");
            }
        }
        match BackupStore::open(&path) {
            Ok(store) => {
                info!(path = %path.display(), "backup store opened");
                return Ok(store);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "backup store unavailable"),
        }
    }

    warn!("using an in-memory backup store; backups will not survive exit");
    BackupStore::open_in_memory()
}
