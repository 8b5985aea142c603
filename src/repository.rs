//! Card repository.
//!
//! Holds the card collection in memory and writes the whole collection back
//! to the [`Store`] under [`CARDS_KEY`] after every mutation. A mutation takes
//! effect in memory only once that write succeeds. The collection is always
//! ordered newest first by `createdAt`.
//!
//! # Import format
//!
//! Imports accept the same document [`CardRepository::export`] produces: a
//! JSON array of card objects. Every element must be an object carrying a
//! non-empty string `id` and `name`; a single bad element rejects the whole
//! file and leaves the collection untouched.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use icu_collator::{Collator, CollatorOptions};
use icu_locid::locale;
use serde::Serialize;
use serde_json::Value;

use crate::error::RepositoryError;
use crate::models::{BusinessCard, CardFields, DEFAULT_INDUSTRY};
use crate::store::{self, Store, CARDS_KEY};

/// Cards sharing one industry label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustryGroup {
    pub industry: String,
    pub cards: Vec<BusinessCard>,
}

/// The card collection plus its backing store.
pub struct CardRepository {
    store: Arc<dyn Store>,
    cards: Vec<BusinessCard>,
}

impl CardRepository {
    /// Read the persisted collection. A missing key is an empty collection.
    pub async fn load(store: Arc<dyn Store>) -> Result<Self, RepositoryError> {
        let mut cards = store::load(store.as_ref(), &CARDS_KEY)
            .await?
            .unwrap_or_default();
        sort_newest_first(&mut cards);
        tracing::debug!(count = cards.len(), "loaded card collection");
        Ok(Self { store, cards })
    }

    /// All cards, newest first.
    pub fn cards(&self) -> &[BusinessCard] {
        &self.cards
    }

    pub fn get(&self, id: &str) -> Option<&BusinessCard> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Add a new card with a fresh id and the current timestamp.
    pub async fn create(&mut self, fields: CardFields) -> Result<BusinessCard, RepositoryError> {
        let card = BusinessCard::from_fields(new_card_id(), Utc::now(), fields);
        let mut cards = Vec::with_capacity(self.cards.len() + 1);
        cards.push(card.clone());
        cards.extend(self.cards.iter().cloned());
        sort_newest_first(&mut cards);
        self.commit(cards).await?;
        tracing::info!(id = %card.id, "created card");
        Ok(card)
    }

    /// Replace the fields of card `id`. Returns `None` (and changes nothing)
    /// when no such card exists.
    pub async fn update(
        &mut self,
        id: &str,
        fields: CardFields,
    ) -> Result<Option<BusinessCard>, RepositoryError> {
        let Some(index) = self.cards.iter().position(|c| c.id == id) else {
            tracing::debug!(id, "update of unknown card ignored");
            return Ok(None);
        };
        let mut cards = self.cards.clone();
        cards[index].apply(fields);
        let updated = cards[index].clone();
        self.commit(cards).await?;
        tracing::info!(id, "updated card");
        Ok(Some(updated))
    }

    /// Remove card `id`. Returns whether a card was removed.
    pub async fn delete(&mut self, id: &str) -> Result<bool, RepositoryError> {
        let cards: Vec<BusinessCard> = self.cards.iter().filter(|c| c.id != id).cloned().collect();
        if cards.len() == self.cards.len() {
            return Ok(false);
        }
        self.commit(cards).await?;
        tracing::info!(id, "deleted card");
        Ok(true)
    }

    /// Merge a backup document into the collection. Incoming cards replace
    /// existing cards with the same id in place; new ids are appended in file
    /// order before the stable newest-first sort. Returns the number of
    /// incoming cards.
    pub async fn import_merge(&mut self, document: &str) -> Result<usize, RepositoryError> {
        let incoming = parse_import(document)?;
        let count = incoming.len();

        let mut merged = self.cards.clone();
        for card in incoming {
            match merged.iter().position(|c| c.id == card.id) {
                Some(index) => merged[index] = card,
                None => merged.push(card),
            }
        }
        sort_newest_first(&mut merged);
        self.commit(merged).await?;
        tracing::info!(imported = count, total = self.cards.len(), "imported cards");
        Ok(count)
    }

    /// Pretty-printed JSON backup of the whole collection.
    pub fn export(&self) -> Result<String, RepositoryError> {
        if self.cards.is_empty() {
            return Err(RepositoryError::EmptyCollection);
        }
        serde_json::to_string_pretty(&self.cards)
            .map_err(|e| RepositoryError::Format(format!("failed to serialize collection: {}", e)))
    }

    /// Cards with `term` in any textual contact field, case-insensitively.
    /// An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<BusinessCard> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.cards.clone();
        }
        self.cards
            .iter()
            .filter(|card| {
                card.text_values()
                    .any(|value| value.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Write `cards` to the store, then adopt them as the collection.
    async fn commit(&mut self, cards: Vec<BusinessCard>) -> Result<(), RepositoryError> {
        store::save(self.store.as_ref(), &CARDS_KEY, &cards).await?;
        self.cards = cards;
        Ok(())
    }
}

/// Partition `cards` by industry. Groups are ordered by label under
/// Traditional Chinese collation, with the default bucket last; cards keep
/// their input order within a group.
pub fn group_by_industry(cards: &[BusinessCard]) -> Vec<IndustryGroup> {
    let mut groups: Vec<IndustryGroup> = Vec::new();
    for card in cards {
        let industry = card.industry_or_default();
        match groups.iter_mut().find(|g| g.industry == industry) {
            Some(group) => group.cards.push(card.clone()),
            None => groups.push(IndustryGroup {
                industry: industry.to_string(),
                cards: vec![card.clone()],
            }),
        }
    }

    let collator = label_collator();
    groups.sort_by(|a, b| {
        let a_default = a.industry == DEFAULT_INDUSTRY;
        let b_default = b.industry == DEFAULT_INDUSTRY;
        a_default
            .cmp(&b_default)
            .then_with(|| compare_labels(collator.as_ref(), &a.industry, &b.industry))
            .then_with(|| a.industry.cmp(&b.industry))
    });
    groups
}

fn label_collator() -> Option<Collator> {
    match Collator::try_new(&locale!("zh-Hant").into(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(e) => {
            tracing::warn!(error = ?e, "zh-Hant collation unavailable; ordering by code point");
            None
        }
    }
}

fn compare_labels(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    match collator {
        Some(collator) => collator.compare(a, b),
        None => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

fn sort_newest_first(cards: &mut [BusinessCard]) {
    cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn new_card_id() -> String {
    format!("card_{}", uuid::Uuid::new_v4().simple())
}

/// Validate every element before deserializing any of them.
fn parse_import(document: &str) -> Result<Vec<BusinessCard>, RepositoryError> {
    let value: Value = serde_json::from_str(document)
        .map_err(|e| RepositoryError::Format(format!("not valid JSON: {}", e)))?;
    let Value::Array(items) = value else {
        return Err(RepositoryError::Format(
            "expected a JSON array of cards".to_string(),
        ));
    };

    for (index, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            return Err(RepositoryError::Format(format!(
                "element {} is not an object",
                index
            )));
        };
        for field in ["id", "name"] {
            match object.get(field).and_then(Value::as_str) {
                Some(s) if !s.trim().is_empty() => {}
                _ => {
                    return Err(RepositoryError::Format(format!(
                        "element {} is missing a non-empty '{}'",
                        index, field
                    )))
                }
            }
        }
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| {
                RepositoryError::Format(format!("element {}: {}", index, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    /// In-memory store whose writes fail while `fail` is set.
    #[derive(Default)]
    struct FailingStore {
        inner: InMemoryStore,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get_raw(key).await
        }

        async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
            if self.fail.load(AtomicOrdering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.set_raw(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }
    }

    fn fields(name: &str) -> CardFields {
        CardFields {
            name: name.into(),
            image: "data:image/jpeg;base64,AA==".into(),
            ..Default::default()
        }
    }

    fn card(id: &str, name: &str, minutes: i64, industry: Option<&str>) -> BusinessCard {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let mut card = BusinessCard::from_fields(id.into(), base + Duration::minutes(minutes), fields(name));
        card.industry = industry.map(String::from);
        card
    }

    async fn repo() -> (Arc<InMemoryStore>, CardRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repo = CardRepository::load(store.clone()).await.unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn create_prepends_and_persists() {
        let (store, mut repo) = repo().await;
        let first = repo.create(fields("Alice")).await.unwrap();
        let second = repo.create(fields("Bob")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.id.starts_with("card_"));
        assert_eq!(repo.cards()[0].id, second.id);

        let reloaded = CardRepository::load(store).await.unwrap();
        assert_eq!(reloaded.cards(), repo.cards());
    }

    #[tokio::test]
    async fn update_is_idempotent_and_keeps_identity() {
        let (_store, mut repo) = repo().await;
        let card = repo.create(fields("Alice")).await.unwrap();

        let mut changed = fields("Alice Chen");
        changed.phone = Some("0912-345-678".into());
        let once = repo.update(&card.id, changed.clone()).await.unwrap().unwrap();
        let twice = repo.update(&card.id, changed).await.unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.id, card.id);
        assert_eq!(twice.created_at, card.created_at);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_of_unknown_id_are_noops() {
        let (_store, mut repo) = repo().await;
        repo.create(fields("Alice")).await.unwrap();
        assert!(repo.update("card_missing", fields("X")).await.unwrap().is_none());
        assert!(!repo.delete("card_missing").await.unwrap());
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.cards()[0].name, "Alice");
    }

    #[tokio::test]
    async fn delete_removes_card() {
        let (_store, mut repo) = repo().await;
        let card = repo.create(fields("Alice")).await.unwrap();
        assert!(repo.delete(&card.id).await.unwrap());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn export_then_import_reproduces_collection() {
        let (_store, mut source) = repo().await;
        for name in ["Alice", "Bob", "Carol"] {
            source.create(fields(name)).await.unwrap();
        }
        let backup = source.export().unwrap();

        let (_store, mut target) = repo().await;
        assert_eq!(target.import_merge(&backup).await.unwrap(), 3);

        let mut expected = source.cards().to_vec();
        let mut actual = target.cards().to_vec();
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        actual.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn import_prefers_incoming_on_id_collision() {
        let (_store, mut repo) = repo().await;
        let existing = serde_json::to_string(&vec![
            card("card_1", "Old Name", 0, None),
            card("card_2", "Kept", 1, None),
        ])
        .unwrap();
        repo.import_merge(&existing).await.unwrap();

        let incoming = serde_json::to_string(&vec![card("card_1", "New Name", 5, None)]).unwrap();
        assert_eq!(repo.import_merge(&incoming).await.unwrap(), 1);

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get("card_1").unwrap().name, "New Name");
        assert_eq!(repo.cards()[0].id, "card_1");
    }

    #[tokio::test]
    async fn import_rejects_bad_documents_without_changes() {
        let (store, mut repo) = repo().await;
        repo.create(fields("Alice")).await.unwrap();
        let before = store.get_raw("business-cards").await.unwrap();

        for doc in [
            "not json",
            r#"{"id":"card_1","name":"A"}"#,
            r#"[{"id":"card_1","name":"A"},{"id":"card_2"}]"#,
            r#"[{"id":"card_1","name":"A"},42]"#,
            r#"[{"id":"","name":"A"}]"#,
        ] {
            let err = repo.import_merge(doc).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Format(_)), "{}", doc);
        }

        assert_eq!(repo.len(), 1);
        assert_eq!(store.get_raw("business-cards").await.unwrap(), before);
    }

    #[tokio::test]
    async fn import_order_is_stable_for_equal_timestamps() {
        let (_store, mut repo) = repo().await;
        let doc = r#"[
            {"id":"card_c","name":"C"},
            {"id":"card_a","name":"A"},
            {"id":"card_b","name":"B"}
        ]"#;
        repo.import_merge(doc).await.unwrap();
        let ids: Vec<&str> = repo.cards().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["card_c", "card_a", "card_b"]);

        repo.import_merge(r#"[{"id":"card_a","name":"A2"},{"id":"card_d","name":"D"}]"#)
            .await
            .unwrap();
        let ids: Vec<&str> = repo.cards().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["card_c", "card_a", "card_b", "card_d"]);
        assert_eq!(repo.get("card_a").unwrap().name, "A2");
    }

    #[tokio::test]
    async fn failed_writes_leave_collection_unchanged() {
        let store = Arc::new(FailingStore::default());
        let mut repo = CardRepository::load(store.clone()).await.unwrap();
        let alice = repo.create(fields("Alice")).await.unwrap();
        store.fail.store(true, AtomicOrdering::SeqCst);

        assert!(repo.create(fields("Bob")).await.is_err());
        assert!(repo.update(&alice.id, fields("Alicia")).await.is_err());
        assert!(repo.delete(&alice.id).await.is_err());
        assert!(repo
            .import_merge(r#"[{"id":"card_9","name":"B"}]"#)
            .await
            .is_err());

        assert_eq!(repo.cards(), std::slice::from_ref(&alice));
        store.fail.store(false, AtomicOrdering::SeqCst);
        let reloaded = CardRepository::load(store).await.unwrap();
        assert_eq!(reloaded.cards(), repo.cards());
    }

    #[tokio::test]
    async fn import_accepts_minimal_entries() {
        let (_store, mut repo) = repo().await;
        let count = repo
            .import_merge(r#"[{"id":"card_9","name":"Minimal"}]"#)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let card = repo.get("card_9").unwrap();
        assert_eq!(card.image, "");
        assert_eq!(card.created_at.timestamp(), 0);
    }

    #[tokio::test]
    async fn export_of_empty_collection_is_reported() {
        let (_store, repo) = repo().await;
        assert!(matches!(repo.export(), Err(RepositoryError::EmptyCollection)));
    }

    #[tokio::test]
    async fn search_finds_card_by_id() {
        let (_store, mut repo) = repo().await;
        let alice = repo.create(fields("Alice")).await.unwrap();
        repo.create(fields("Bob")).await.unwrap();

        let found = repo.search(&alice.id);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Alice");
        assert!(repo.search("base64").is_empty());
    }

    #[tokio::test]
    async fn search_matches_any_text_field_case_insensitively() {
        let (_store, mut repo) = repo().await;
        let mut a = fields("Alice");
        a.email = Some("Alice@GMAIL.com".into());
        let mut b = fields("Bob");
        b.email = Some("bob@corp.example".into());
        let mut c = fields("Carol");
        c.website = Some("https://gmail-tools.example".into());
        for f in [a, b, c] {
            repo.create(f).await.unwrap();
        }

        assert_eq!(repo.search("").len(), 3);
        assert_eq!(repo.search("   ").len(), 3);

        let mut names: Vec<String> = repo.search("gmail").into_iter().map(|c| c.name).collect();
        names.sort();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }

    #[test]
    fn grouping_collates_chinese_labels_with_default_last() {
        let cards = vec![
            card("card_1", "A", 3, Some("科技業")),
            card("card_2", "B", 2, Some("一般")),
            card("card_3", "C", 1, Some("金融業")),
            card("card_4", "D", 0, None),
        ];
        let groups = group_by_industry(&cards);
        let labels: Vec<&str> = groups.iter().map(|g| g.industry.as_str()).collect();
        assert_eq!(labels, vec!["金融業", "科技業", DEFAULT_INDUSTRY]);
        assert_eq!(groups[2].cards.len(), 2);
        assert_eq!(groups[2].cards[0].id, "card_2");
        assert_eq!(groups[2].cards[1].id, "card_4");
    }

    #[test]
    fn grouping_orders_labels_case_insensitively() {
        let cards = vec![
            card("card_1", "A", 0, Some("finance")),
            card("card_2", "B", 0, Some("Design")),
            card("card_3", "C", 0, Some("")),
        ];
        let labels: Vec<String> = group_by_industry(&cards)
            .into_iter()
            .map(|g| g.industry)
            .collect();
        assert_eq!(labels, vec!["Design", "finance", DEFAULT_INDUSTRY]);
    }
}
