//! Card retrieval by ID.
//!
//! Used by `cardex get`. The field printer is shared with `scan` and `edit`,
//! which show the form draft before saving.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::models::{BusinessCard, CardFields};
use crate::repository::CardRepository;
use crate::store::SqliteStore;

/// Look up one card.
pub async fn get_card(config: &Config, id: &str) -> Result<BusinessCard> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let repository = CardRepository::load(store.clone()).await;
    store.close().await;
    let card = repository?.get(id).cloned();

    match card {
        Some(card) => Ok(card),
        None => bail!("card not found: {}", id),
    }
}

/// CLI entry point: print all fields of a card.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let card = get_card(config, id).await?;

    println!("--- {} ---", card.id);
    println!("created:  {}", card.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print_fields(&card.fields());
    Ok(())
}

/// Print the contact fields of a card or form draft.
pub fn print_fields(fields: &CardFields) {
    let rows = [
        ("name", Some(fields.name.as_str())),
        ("title", fields.title.as_deref()),
        ("company", fields.company.as_deref()),
        ("industry", fields.industry.as_deref()),
        ("phone", fields.phone.as_deref()),
        ("email", fields.email.as_deref()),
        ("address", fields.address.as_deref()),
        ("website", fields.website.as_deref()),
        ("social", fields.social.as_deref()),
    ];
    for (label, value) in rows {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            println!("{:<9} {}", format!("{}:", label), value);
        }
    }
    println!("{:<9} {}", "image:", describe_image(&fields.image));
}

/// Short description of a data URL image, e.g. `image/jpeg, 48.2 KB`.
pub fn describe_image(data_url: &str) -> String {
    match crate::capture::CapturedFrame::from_data_url(data_url) {
        Some(frame) => format!(
            "{}, {}",
            frame.mime_type,
            crate::stats::format_bytes(frame.bytes.len() as u64)
        ),
        None if data_url.is_empty() => "(none)".to_string(),
        None => "(unrecognized)".to_string(),
    }
}
