//! Collection statistics.
//!
//! A quick summary of what's stored: card counts per industry, how many
//! cards carry a portrait crop or contact details, and database size. Used
//! by `cardex stats`.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::credential;
use crate::repository::{group_by_industry, CardRepository};
use crate::store::SqliteStore;

/// Run the stats command: load the collection and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let loaded = CardRepository::load(store.clone()).await;
    let key = credential::get(store.as_ref()).await;
    store.close().await;
    let repository = loaded?;
    let has_key = key?.is_some();

    let cards = repository.cards();
    let with_email = cards.iter().filter(|c| c.email.is_some()).count();
    let with_phone = cards.iter().filter(|c| c.phone.is_some()).count();
    let image_bytes: usize = cards.iter().map(|c| c.image.len()).sum();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Cardex — Collection Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  API key:     {}", if has_key { "configured" } else { "not set" });
    println!();
    println!("  Cards:       {}", cards.len());
    println!("  With email:  {}", with_email);
    println!("  With phone:  {}", with_phone);
    println!("  Images:      {}", format_bytes(image_bytes as u64));

    if let Some(newest) = cards.first() {
        println!(
            "  Newest:      {} ({})",
            newest.name,
            newest.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let groups = group_by_industry(cards);
    if !groups.is_empty() {
        println!();
        println!("  By industry:");
        println!("  {:<24} {:>6}", "INDUSTRY", "CARDS");
        println!("  {}", "-".repeat(31));
        for group in &groups {
            println!("  {:<24} {:>6}", group.industry, group.cards.len());
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
