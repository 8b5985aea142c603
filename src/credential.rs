//! Extraction credential management (`cardex key`).
//!
//! The credential is stored under the `gemini-api-key` key and only ever
//! sent to the extraction endpoint. It is never printed in full.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::error::StoreError;
use crate::prompt;
use crate::store::{self, SqliteStore, Store, CREDENTIAL_KEY};

/// The stored credential, if any.
pub async fn get(store: &dyn Store) -> Result<Option<String>, StoreError> {
    Ok(store::load(store, &CREDENTIAL_KEY)
        .await?
        .filter(|k| !k.trim().is_empty()))
}

/// Store `credential` (trimmed). Returns `false` for blank input.
pub async fn set(store: &dyn Store, credential: &str) -> Result<bool, StoreError> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Ok(false);
    }
    store::save(store, &CREDENTIAL_KEY, &credential.to_string()).await?;
    Ok(true)
}

pub async fn reset(store: &dyn Store) -> Result<(), StoreError> {
    store::clear(store, &CREDENTIAL_KEY).await
}

/// Masked form for display: first and last four characters only.
pub fn mask(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}

pub async fn run_key_set(config: &Config, credential: &str) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let stored = set(&store, credential).await;
    store.close().await;
    let stored = stored?;
    if !stored {
        bail!("API key must not be empty");
    }
    println!("API key saved.");
    Ok(())
}

pub async fn run_key_reset(config: &Config, yes: bool) -> Result<()> {
    if !yes && !prompt::confirm("Remove the stored API key?")? {
        println!("Cancelled.");
        return Ok(());
    }
    let store = SqliteStore::open(&config.db.path).await?;
    let result = reset(&store).await;
    store.close().await;
    result?;
    println!("API key removed. Run `cardex key set <KEY>` to configure a new one.");
    Ok(())
}

pub async fn run_key_show(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let credential = get(&store).await;
    store.close().await;
    let credential = credential?;
    match credential {
        Some(key) => println!("API key: {}", mask(&key)),
        None => println!("No API key configured. Run `cardex key set <KEY>`."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn mask_hides_the_middle() {
        assert_eq!(mask("AIzaSyExample1234"), "AIza*********1234");
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask(""), "****");
    }

    #[tokio::test]
    async fn set_trims_and_rejects_blank() {
        let store = InMemoryStore::new();
        assert!(!set(&store, "   ").await.unwrap());
        assert_eq!(get(&store).await.unwrap(), None);

        assert!(set(&store, "  secret-key \n").await.unwrap());
        assert_eq!(get(&store).await.unwrap().as_deref(), Some("secret-key"));

        reset(&store).await.unwrap();
        assert_eq!(get(&store).await.unwrap(), None);
    }
}
