//! Backup export.
//!
//! Writes the whole collection as a pretty-printed JSON array to
//! `ai-card-backup-<YYYY-MM-DD>.json` (or `--output`, `-` for stdout). The
//! same file can be merged back with `cardex import`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::RepositoryError;
use crate::repository::CardRepository;
use crate::store::SqliteStore;

/// Default backup file name for the given date.
pub fn backup_file_name(date: chrono::NaiveDate) -> String {
    format!("ai-card-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Export the collection.
///
/// An empty collection prints a notice and writes nothing.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let repository = CardRepository::load(store.clone()).await;
    store.close().await;
    let repository = repository?;

    let document = match repository.export() {
        Ok(document) => document,
        Err(RepositoryError::EmptyCollection) => {
            println!("There are no cards to export.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match output {
        Some(path) if path.as_os_str() == "-" => {
            println!("{}", document);
        }
        _ => {
            let path = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(backup_file_name(chrono::Local::now().date_naive())));
            std::fs::write(&path, document.as_bytes())
                .with_context(|| format!("Failed to write backup file: {}", path.display()))?;
            println!("Exported {} cards to {}", repository.len(), path.display());
        }
    }
    Ok(())
}
