//! Core data models used throughout Cardex.
//!
//! These types represent the cards stored in the collection, the editable
//! form payload, and the transient result of an AI extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Industry bucket for cards that have no (or an empty) industry.
pub const DEFAULT_INDUSTRY: &str = "一般";

/// A stored business card.
///
/// Serialized with camelCase keys so backups stay compatible with the
/// browser edition of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCard {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Data URL (`data:image/jpeg;base64,...`).
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

impl BusinessCard {
    /// Assemble a card from an identity and a form payload.
    pub fn from_fields(id: String, created_at: DateTime<Utc>, fields: CardFields) -> Self {
        Self {
            id,
            name: fields.name,
            phone: fields.phone,
            email: fields.email,
            company: fields.company,
            title: fields.title,
            image: fields.image,
            created_at,
            address: fields.address,
            website: fields.website,
            social: fields.social,
            industry: fields.industry,
        }
    }

    /// The editable part of this card.
    pub fn fields(&self) -> CardFields {
        CardFields {
            name: self.name.clone(),
            image: self.image.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            company: self.company.clone(),
            title: self.title.clone(),
            address: self.address.clone(),
            website: self.website.clone(),
            social: self.social.clone(),
            industry: self.industry.clone(),
        }
    }

    /// Replace every editable field, keeping `id` and `created_at`.
    pub fn apply(&mut self, fields: CardFields) {
        let id = std::mem::take(&mut self.id);
        let created_at = self.created_at;
        *self = Self::from_fields(id, created_at, fields);
    }

    /// Industry label, falling back to [`DEFAULT_INDUSTRY`].
    pub fn industry_or_default(&self) -> &str {
        match self.industry.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => DEFAULT_INDUSTRY,
        }
    }

    /// The id and textual contact fields, used for search. The image
    /// payload is not included.
    pub fn text_values(&self) -> impl Iterator<Item = &str> {
        [self.id.as_str(), self.name.as_str()].into_iter().chain(
            [
                &self.phone,
                &self.email,
                &self.company,
                &self.title,
                &self.address,
                &self.website,
                &self.social,
                &self.industry,
            ]
            .into_iter()
            .filter_map(|v| v.as_deref()),
        )
    }
}

/// Form payload: every card field except `id` and `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFields {
    pub name: String,
    pub image: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub social: Option<String>,
    pub industry: Option<String>,
}

/// Optional per-field overrides applied on top of a form (CLI flags).
#[derive(Debug, Clone, Default)]
pub struct FieldOverrides {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub social: Option<String>,
    pub industry: Option<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.company.is_none()
            && self.title.is_none()
            && self.address.is_none()
            && self.website.is_none()
            && self.social.is_none()
            && self.industry.is_none()
    }

    /// Overwrite the matching fields of `fields`. An empty override clears
    /// an optional field.
    pub fn apply_to(&self, fields: &mut CardFields) {
        if let Some(name) = &self.name {
            fields.name = name.trim().to_string();
        }
        let set = |slot: &mut Option<String>, value: &Option<String>| {
            if let Some(v) = value {
                *slot = non_empty(v);
            }
        };
        set(&mut fields.phone, &self.phone);
        set(&mut fields.email, &self.email);
        set(&mut fields.company, &self.company);
        set(&mut fields.title, &self.title);
        set(&mut fields.address, &self.address);
        set(&mut fields.website, &self.website);
        set(&mut fields.social, &self.social);
        set(&mut fields.industry, &self.industry);
    }
}

/// Normalized rectangle locating a portrait on a card image.
///
/// All values are fractions of the image dimensions; `(x, y)` is the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Structured fields returned by the AI extraction step. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub company: String,
    pub title: String,
    pub address: String,
    pub website: String,
    pub social: String,
    pub industry: String,
    pub photo_bounding_box: Option<BoundingBox>,
}

impl Default for ExtractedFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            company: String::new(),
            title: String::new(),
            address: String::new(),
            website: String::new(),
            social: String::new(),
            industry: DEFAULT_INDUSTRY.to_string(),
            photo_bounding_box: None,
        }
    }
}

impl ExtractedFields {
    /// Build a form pre-fill from the extraction and the chosen image.
    pub fn into_fields(self, image: String) -> CardFields {
        CardFields {
            name: self.name.trim().to_string(),
            image,
            phone: non_empty(&self.phone),
            email: non_empty(&self.email),
            company: non_empty(&self.company),
            title: non_empty(&self.title),
            address: non_empty(&self.address),
            website: non_empty(&self.website),
            social: non_empty(&self.social),
            industry: non_empty(&self.industry),
        }
    }
}

/// Display theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{}': use light or dark", other)),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card() -> BusinessCard {
        BusinessCard::from_fields(
            "card_1".into(),
            Utc::now(),
            CardFields {
                name: "Jane Doe".into(),
                image: "data:image/jpeg;base64,AAAA".into(),
                email: Some("jane@gmail.com".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn industry_defaults_when_missing_or_blank() {
        let mut card = sample_card();
        assert_eq!(card.industry_or_default(), DEFAULT_INDUSTRY);
        card.industry = Some("  ".into());
        assert_eq!(card.industry_or_default(), DEFAULT_INDUSTRY);
        card.industry = Some("金融業".into());
        assert_eq!(card.industry_or_default(), "金融業");
    }

    #[test]
    fn text_values_cover_id_but_not_image() {
        let card = sample_card();
        let values: Vec<&str> = card.text_values().collect();
        assert_eq!(values, vec!["card_1", "Jane Doe", "jane@gmail.com"]);
    }

    #[test]
    fn apply_keeps_identity() {
        let mut card = sample_card();
        let created = card.created_at;
        card.apply(CardFields {
            name: "Janet".into(),
            image: "data:image/png;base64,BBBB".into(),
            ..Default::default()
        });
        assert_eq!(card.id, "card_1");
        assert_eq!(card.created_at, created);
        assert_eq!(card.name, "Janet");
        assert_eq!(card.email, None);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(sample_card()).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
        assert!(json.get("phone").is_none());
    }

    #[test]
    fn deserializes_browser_backup_entry() {
        let raw = r#"{"id":"card_1718000000000","name":"王小明","phone":"","email":"","company":"Acme","title":"","image":"data:image/jpeg;base64,AA==","createdAt":"2024-06-10T06:13:20.000Z","industry":"科技業"}"#;
        let card: BusinessCard = serde_json::from_str(raw).unwrap();
        assert_eq!(card.company.as_deref(), Some("Acme"));
        assert_eq!(card.phone.as_deref(), Some(""));
        assert_eq!(card.created_at.timestamp(), 1_718_000_000);
    }

    #[test]
    fn extraction_prefill_drops_blank_fields() {
        let extracted = ExtractedFields {
            name: " Jane Doe ".into(),
            company: "Corp Inc.".into(),
            ..Default::default()
        };
        let fields = extracted.into_fields("data:image/jpeg;base64,AA==".into());
        assert_eq!(fields.name, "Jane Doe");
        assert_eq!(fields.company.as_deref(), Some("Corp Inc."));
        assert_eq!(fields.phone, None);
        assert_eq!(fields.industry.as_deref(), Some(DEFAULT_INDUSTRY));
    }

    #[test]
    fn overrides_replace_and_clear() {
        let mut fields = CardFields {
            name: "Old".into(),
            phone: Some("123".into()),
            ..Default::default()
        };
        let overrides = FieldOverrides {
            name: Some("New".into()),
            phone: Some(String::new()),
            title: Some("CEO".into()),
            ..Default::default()
        };
        overrides.apply_to(&mut fields);
        assert_eq!(fields.name, "New");
        assert_eq!(fields.phone, None);
        assert_eq!(fields.title.as_deref(), Some("CEO"));
    }

    #[test]
    fn theme_parse_and_toggle() {
        assert_eq!("Dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("blue".parse::<Theme>().is_err());
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
    }
}
