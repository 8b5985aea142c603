//! Persistent key-value storage.
//!
//! The [`Store`] trait is a small string-keyed, string-valued abstraction
//! over durable storage. Values are JSON documents; [`StoreKey`] ties each
//! key name to the Rust type stored under it so callers go through
//! [`load`] / [`save`] instead of handling raw JSON.
//!
//! | Key | Type |
//! |-----|------|
//! | [`CREDENTIAL_KEY`] | `String` |
//! | [`CARDS_KEY`] | `Vec<BusinessCard>` |
//! | [`THEME_KEY`] | [`Theme`] |
//!
//! Two backends are provided: [`SqliteStore`] (the `kv` table created by
//! [`crate::migrate`]) and [`InMemoryStore`] for tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::models::{BusinessCard, Theme};

/// A key name bound to the type of value stored under it.
pub struct StoreKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StoreKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The extraction credential. Absent means "not configured".
pub const CREDENTIAL_KEY: StoreKey<String> = StoreKey::new("gemini-api-key");
/// The whole card collection.
pub const CARDS_KEY: StoreKey<Vec<BusinessCard>> = StoreKey::new("business-cards");
/// Theme preference. Absent means "derive from the OS preference".
pub const THEME_KEY: StoreKey<Theme> = StoreKey::new("theme");

/// Durable string key-value storage.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the raw JSON value stored under `key`.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write (insert or replace) the raw JSON value under `key`.
    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode the value under `key`.
pub async fn load<T: DeserializeOwned>(
    store: &dyn Store,
    key: &StoreKey<T>,
) -> Result<Option<T>, StoreError> {
    match store.get_raw(key.name()).await? {
        None => Ok(None),
        Some(raw) if raw == "null" => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.name().to_string(),
                source,
            }),
    }
}

/// Encode and write `value` under `key`.
pub async fn save<T: Serialize>(
    store: &dyn Store,
    key: &StoreKey<T>,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
        key: key.name().to_string(),
        source,
    })?;
    store.set_raw(key.name(), raw).await
}

/// Remove the value under `key`.
pub async fn clear<T>(store: &dyn Store, key: &StoreKey<T>) -> Result<(), StoreError> {
    store.remove(key.name()).await
}

// ============ SQLite backend ============

/// [`Store`] backed by the SQLite `kv` table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = crate::db::connect_path(path).await?;
        crate::migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        tracing::debug!(key, "persisted value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============ In-memory backend ============

/// In-memory [`Store`] for tests.
#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}
