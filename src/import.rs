//! Backup import (`cardex import <FILE>`).
//!
//! Merges a backup produced by `cardex export` (or the browser edition) into
//! the collection by card id. A malformed file is rejected as a whole.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::RepositoryError;
use crate::repository::CardRepository;
use crate::store::SqliteStore;

pub async fn run_import(config: &Config, file: &Path) -> Result<()> {
    let document = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read import file: {}", file.display()))?;

    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let result = match CardRepository::load(store.clone()).await {
        Ok(mut repository) => repository
            .import_merge(&document)
            .await
            .map(|count| (count, repository.len())),
        Err(e) => Err(e),
    };
    store.close().await;

    match result {
        Ok((count, total)) => {
            println!(
                "Imported {} card{} ({} total).",
                count,
                if count == 1 { "" } else { "s" },
                total
            );
            Ok(())
        }
        Err(RepositoryError::Format(reason)) => {
            bail!(
                "Import failed: {} is not a valid card backup ({}). No cards were changed.",
                file.display(),
                reason
            )
        }
        Err(e) => Err(e.into()),
    }
}
