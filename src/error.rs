//! Error taxonomy for the library surface.
//!
//! Command functions in the binary work with `anyhow::Result`; everything
//! below them returns one of these typed errors so callers can branch on
//! the failure category (e.g. offer a credential reset, fall back to the
//! uncropped image, or report a malformed import file).

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the AI extraction step.
///
/// Every variant carries a message that is safe to show to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// No credential has been configured.
    #[error("API key is not configured. Run `cardex key set <KEY>` first.")]
    Configuration,

    #[error("AI analysis failed due to an invalid API key. Please check the key you provided and try again. ({0})")]
    InvalidCredential(String),

    #[error("AI analysis failed because the API quota has been exceeded. Please check your project quotas. ({0})")]
    QuotaExceeded(String),

    #[error("A network error occurred while contacting the AI service. Please check your internet connection. ({0})")]
    Network(String),

    #[error("Failed to analyze the business card. The image might be unclear or the format is not supported. ({0})")]
    UnrecognizedResponse(String),
}

impl ExtractionError {
    /// Whether the failure looks like a credential problem, in which case
    /// the user should be offered a credential reset.
    pub fn is_credential_related(&self) -> bool {
        matches!(
            self,
            ExtractionError::Configuration | ExtractionError::InvalidCredential(_)
        )
    }
}

/// Failures of the portrait crop. Always recoverable by using the original.
#[derive(Error, Debug)]
pub enum CropError {
    #[error("Failed to render cropped image: {0}")]
    Render(String),
}

/// Failures of a frame source (the scanner's camera stand-in).
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Frame source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read frame from '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Frame source was already released")]
    Released,
}

/// Failures of the persistent key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to (de)serialize value for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of card repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Import payload is not an array of card objects with `id` and `name`.
    #[error("Invalid import format: {0}")]
    Format(String),

    /// Nothing to export.
    #[error("The card collection is empty; there is nothing to export.")]
    EmptyCollection,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Failures of the view controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Cannot handle '{event}' while in the {view} view")]
    InvalidTransition {
        view: &'static str,
        event: &'static str,
    },

    #[error("Field '{0}' is required")]
    MissingField(&'static str),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_related_variants() {
        assert!(ExtractionError::Configuration.is_credential_related());
        assert!(ExtractionError::InvalidCredential("403".into()).is_credential_related());
        assert!(!ExtractionError::QuotaExceeded("429".into()).is_credential_related());
        assert!(!ExtractionError::Network("dns".into()).is_credential_related());
        assert!(!ExtractionError::UnrecognizedResponse("x".into()).is_credential_related());
    }

    #[test]
    fn repository_error_wraps_store_error() {
        let err: RepositoryError = StoreError::Serialization {
            key: "business-cards".into(),
            source: serde_json::from_str::<u8>("x").unwrap_err(),
        }
        .into();
        assert!(err.to_string().contains("business-cards"));
    }
}
