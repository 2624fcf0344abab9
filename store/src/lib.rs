pub mod cli;
pub mod clock;
pub mod memory;
pub mod sqlite;
pub mod subscribers;

pub use memory::{MemoryStore, Operation};
pub use sqlite::SqliteStore;

use anyhow::Result;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Default location of the local document database.
pub fn default_db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from("org", "chat", "chat_client")
        .ok_or_else(|| anyhow::anyhow!("failed to determine data directory"))?;
    Ok(proj.data_dir().join("documents.sqlite3"))
}
