//! `cardex list`: the card collection grouped by industry.
//!
//! Human output prints one section per industry with the default bucket
//! last. `--json` prints the same grouping as JSON for scripting.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::models::BusinessCard;
use crate::repository::{group_by_industry, CardRepository};
use crate::store::SqliteStore;

/// Run the list command, optionally filtered by `search`.
pub async fn run_list(config: &Config, search: Option<&str>, json: bool) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let repository = CardRepository::load(store.clone()).await;
    store.close().await;
    let repository = repository?;

    let term = search.unwrap_or("");
    let cards = repository.search(term);
    let groups = group_by_industry(&cards);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if cards.is_empty() {
        if repository.is_empty() {
            println!("No cards yet. Run `cardex scan <IMAGE>` to add one.");
        } else {
            println!("No cards match '{}'.", term.trim());
        }
        return Ok(());
    }

    for group in &groups {
        println!("{} ({})", group.industry, group.cards.len());
        for card in &group.cards {
            println!("  {}", summary_line(card));
        }
        println!();
    }
    println!(
        "{} of {} card{}",
        cards.len(),
        repository.len(),
        if repository.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

/// One-line listing: id, name, then title/company/contact when present.
fn summary_line(card: &BusinessCard) -> String {
    let mut line = format!("{}  {}", card.id, card.name);
    let role = match (card.title.as_deref(), card.company.as_deref()) {
        (Some(title), Some(company)) => Some(format!("{}, {}", title, company)),
        (Some(title), None) => Some(title.to_string()),
        (None, Some(company)) => Some(company.to_string()),
        (None, None) => None,
    };
    if let Some(role) = role {
        line.push_str(&format!(" — {}", role));
    }
    if let Some(contact) = card.email.as_deref().or(card.phone.as_deref()) {
        line.push_str(&format!(" <{}>", contact));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardFields;

    #[test]
    fn summary_includes_role_and_contact() {
        let mut card = BusinessCard::from_fields(
            "card_1".into(),
            chrono::Utc::now(),
            CardFields {
                name: "Jane Doe".into(),
                ..Default::default()
            },
        );
        assert_eq!(summary_line(&card), "card_1  Jane Doe");

        card.title = Some("CEO".into());
        card.company = Some("Corp Inc.".into());
        card.phone = Some("555-0100".into());
        assert_eq!(
            summary_line(&card),
            "card_1  Jane Doe — CEO, Corp Inc. <555-0100>"
        );
    }
}
