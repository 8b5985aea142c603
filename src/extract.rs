//! AI field extraction for business card images.
//!
//! Defines the [`Extractor`] trait and the [`GeminiExtractor`] implementation,
//! which sends the card image and a fixed instruction prompt to the Gemini
//! `generateContent` endpoint and turns the reply into [`ExtractedFields`].
//!
//! # Response normalization
//!
//! The model is asked for a bare JSON object but sometimes wraps it in a
//! Markdown code fence. [`unwrap_code_fence`] strips such a fence before the
//! text is parsed by [`parse_extraction`]. Missing fields become empty
//! strings, a missing industry becomes [`DEFAULT_INDUSTRY`], and a missing or
//! malformed `photoBoundingBox` becomes `None`.
//!
//! # Failure classification
//!
//! Failures are mapped to [`ExtractionError`] variants. Structured data is
//! preferred (HTTP status, the API's `error.status` and `ErrorInfo.reason`);
//! the message text is only sniffed for keywords when nothing structured
//! matches. The keyword fallback is best-effort and may misclassify.
//!
//! # Session cache
//!
//! [`SessionCache`] holds at most one HTTP session, keyed by the SHA-256 of
//! the credential. Using a different credential replaces the cached session.

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::models::{BoundingBox, ExtractedFields, DEFAULT_INDUSTRY};

/// Instruction sent alongside every card image.
pub const EXTRACTION_PROMPT: &str = r#"
You are an expert business card scanner. Analyze the provided image of a business card.
1. Extract the following information:
   - name (the person's full name, can be in Chinese or English)
   - phone (the primary phone number)
   - email (the email address)
   - company (the company name)
   - title (the job title)
   - address (the full company address)
   - website (the company website URL)
   - social (a relevant social media URL, like LinkedIn)
2. Analyze the company name and business details to classify it into a general industry category. **Use Chinese for the industry category** (e.g., 科技業, 金融業, 醫療保健, 零售業, 餐飲業, 行銷業, 房地產業, etc.).
3. Detect if there is a portrait photo of a person on the card.
   - If a photo is found, provide its bounding box with normalized coordinates (from 0 to 1 for x, y, width, height, where (x,y) is the top-left corner).

Return the result as a single, minified JSON object.
The JSON must have these exact keys: "name", "phone", "email", "company", "title", "address", "website", "social", "industry", "photoBoundingBox".
If a field is not found, its value should be an empty string "".
The "photoBoundingBox" key should have an object with "x", "y", "width", "height" as keys, or be null if no photo is found.

Example response with photo: {"name":"Jane Doe","phone":"+1-555-987-6543","email":"jane@corp.com","company":"Corp Inc.","title":"CEO","address":"123 Innovation Dr, Tech City","website":"corp.com","social":"linkedin.com/in/janedoe","industry":"科技業","photoBoundingBox":{"x":0.05,"y":0.1,"width":0.25,"height":0.4}}
Example response without photo: {"name":"John Smith","phone":"555-111-2222","email":"smith@work.net","company":"Work Net LLC","title":"Developer","address":"","website":"","social":"","industry":"科技業","photoBoundingBox":null}
"#;

/// Converts a card image into structured fields.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract fields from `image` (raw encoded bytes of type `mime_type`)
    /// using `credential` for the remote call.
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
        credential: &str,
    ) -> Result<ExtractedFields, ExtractionError>;
}

// ============ Session cache ============

/// Single-slot cache of a per-credential session.
///
/// The slot is keyed by the hex SHA-256 of the credential, so the raw
/// credential is never used as a lookup key.
pub struct SessionCache<T> {
    slot: Mutex<Option<(String, Arc<T>)>>,
}

impl<T> Default for SessionCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> SessionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached session for `credential`, or build one with `init`
    /// and replace whatever was cached before.
    pub fn get_or_try_insert_with<E>(
        &self,
        credential: &str,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let key = credential_hash(credential);
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_key, session)) = slot.as_ref() {
            if *cached_key == key {
                return Ok(Arc::clone(session));
            }
            tracing::debug!("credential changed; replacing cached extraction session");
        }
        let session = Arc::new(init()?);
        *slot = Some((key, Arc::clone(&session)));
        Ok(session)
    }
}

/// Hex SHA-256 of a credential.
pub fn credential_hash(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    hex::encode(hasher.finalize())
}

// ============ Gemini extractor ============

/// HTTP session bound to one credential.
struct GeminiSession {
    client: reqwest::Client,
    credential: String,
}

/// [`Extractor`] backed by the Gemini `generateContent` REST API.
pub struct GeminiExtractor {
    config: ExtractionConfig,
    sessions: SessionCache<GeminiSession>,
}

impl GeminiExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            sessions: SessionCache::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn session(&self, credential: &str) -> Result<Arc<GeminiSession>, ExtractionError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        self.sessions.get_or_try_insert_with(credential, || {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ExtractionError::Network(e.to_string()))?;
            Ok(GeminiSession {
                client,
                credential: credential.to_string(),
            })
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

fn build_request(image: &[u8], mime_type: &str) -> GenerateRequest {
    let data = base64::engine::general_purpose::STANDARD.encode(image);
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data,
                    },
                },
                Part::Text {
                    text: EXTRACTION_PROMPT.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
        },
    }
}

#[async_trait]
impl Extractor for GeminiExtractor {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
        credential: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ExtractionError::Configuration);
        }

        let session = self.session(credential)?;
        let body = build_request(image, mime_type);

        tracing::info!(
            model = %self.config.model,
            bytes = image.len(),
            mime_type,
            "sending card image for extraction"
        );

        let response = session
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &session.credential)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(classify_transport_error)?;

        if !status.is_success() {
            let err = classify_api_error(status.as_u16(), &text);
            tracing::warn!(status = status.as_u16(), error = %err, "extraction request failed");
            return Err(err);
        }

        let reply: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ExtractionError::UnrecognizedResponse(e.to_string()))?;
        let reply_text = response_text(&reply)?;

        let fields = parse_extraction(&reply_text)?;
        tracing::info!(
            has_photo = fields.photo_bounding_box.is_some(),
            industry = %fields.industry,
            "extraction complete"
        );
        Ok(fields)
    }
}

fn response_text(reply: &GenerateResponse) -> Result<String, ExtractionError> {
    let text: String = reply
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = reply
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
            .unwrap_or_else(|| "empty model reply".to_string());
        return Err(ExtractionError::UnrecognizedResponse(reason));
    }
    Ok(text)
}

// ============ Response normalization ============

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").expect("fence pattern is valid")
    })
}

/// Strip an optional Markdown code fence (```` ```json ... ``` ````) around
/// the model reply. Text without a fence is returned trimmed.
pub fn unwrap_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_pattern().captures(trimmed).and_then(|c| c.get(2)) {
        Some(inner) if !inner.as_str().trim().is_empty() => inner.as_str().trim(),
        _ => trimmed,
    }
}

/// Parse a model reply into [`ExtractedFields`], applying defaults.
pub fn parse_extraction(text: &str) -> Result<ExtractedFields, ExtractionError> {
    let json = unwrap_code_fence(text);
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ExtractionError::UnrecognizedResponse(format!("reply is not JSON: {}", e)))?;
    let obj = value.as_object().ok_or_else(|| {
        ExtractionError::UnrecognizedResponse("reply is not a JSON object".to_string())
    })?;

    let field = |key: &str| -> String {
        match obj.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    };

    let industry = match field("industry") {
        s if s.is_empty() => DEFAULT_INDUSTRY.to_string(),
        s => s,
    };

    Ok(ExtractedFields {
        name: field("name"),
        phone: field("phone"),
        email: field("email"),
        company: field("company"),
        title: field("title"),
        address: field("address"),
        website: field("website"),
        social: field("social"),
        industry,
        photo_bounding_box: obj.get("photoBoundingBox").and_then(parse_bounding_box),
    })
}

fn parse_bounding_box(value: &Value) -> Option<BoundingBox> {
    let raw: BoundingBox = serde_json::from_value(value.clone()).ok()?;
    let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    let bbox = BoundingBox {
        x: clamp(raw.x),
        y: clamp(raw.y),
        width: clamp(raw.width),
        height: clamp(raw.height),
    };
    if bbox.width <= 0.0 || bbox.height <= 0.0 {
        return None;
    }
    Some(bbox)
}

// ============ Error classification ============

/// Classify a non-2xx API reply. Structured fields win over keywords.
fn classify_api_error(status: u16, body: &str) -> ExtractionError {
    let parsed: Option<ApiError> = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);

    let message = match &parsed {
        Some(err) if !err.message.is_empty() => format!("HTTP {}: {}", status, err.message),
        _ => format!("HTTP {}: {}", status, body.trim()),
    };

    let api_status = parsed.as_ref().map(|e| e.status.as_str()).unwrap_or("");
    let key_invalid = parsed
        .as_ref()
        .map(|e| {
            e.details
                .iter()
                .any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"))
        })
        .unwrap_or(false);

    if matches!(status, 401 | 403)
        || key_invalid
        || matches!(api_status, "PERMISSION_DENIED" | "UNAUTHENTICATED")
    {
        return ExtractionError::InvalidCredential(message);
    }
    if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
        return ExtractionError::QuotaExceeded(message);
    }

    classify_message(&message)
}

fn classify_transport_error(err: reqwest::Error) -> ExtractionError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return ExtractionError::Network(err.to_string());
    }
    classify_message(&err.to_string())
}

/// Keyword fallback used when no structured signal is available.
pub fn classify_message(message: &str) -> ExtractionError {
    let lower = message.to_lowercase();
    if lower.contains("api key") || lower.contains("permission denied") {
        ExtractionError::InvalidCredential(message.to_string())
    } else if lower.contains("quota") {
        ExtractionError::QuotaExceeded(message.to_string())
    } else if lower.contains("fetch") || lower.contains("network") {
        ExtractionError::Network(message.to_string())
    } else {
        ExtractionError::UnrecognizedResponse(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_json_fence() {
        let text = "```json\n{\"name\":\"Jane\"}\n```";
        assert_eq!(unwrap_code_fence(text), "{\"name\":\"Jane\"}");
    }

    #[test]
    fn unwraps_bare_fence_and_whitespace() {
        let text = "  ```\n{\"name\":\"Jane\"}\n```  ";
        assert_eq!(unwrap_code_fence(text), "{\"name\":\"Jane\"}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(unwrap_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn parse_applies_defaults() {
        let fields = parse_extraction(r#"{"name":"John Smith","phone":"555-111-2222"}"#).unwrap();
        assert_eq!(fields.name, "John Smith");
        assert_eq!(fields.phone, "555-111-2222");
        assert_eq!(fields.email, "");
        assert_eq!(fields.industry, DEFAULT_INDUSTRY);
        assert_eq!(fields.photo_bounding_box, None);
    }

    #[test]
    fn parse_reads_bounding_box() {
        let fields = parse_extraction(
            "```json\n{\"name\":\"Jane Doe\",\"industry\":\"科技業\",\"photoBoundingBox\":{\"x\":0.05,\"y\":0.1,\"width\":0.25,\"height\":0.4}}\n```",
        )
        .unwrap();
        assert_eq!(fields.industry, "科技業");
        assert_eq!(
            fields.photo_bounding_box,
            Some(BoundingBox {
                x: 0.05,
                y: 0.1,
                width: 0.25,
                height: 0.4
            })
        );
    }

    #[test]
    fn parse_drops_degenerate_or_malformed_box() {
        let zero = parse_extraction(
            r#"{"name":"A","photoBoundingBox":{"x":0.1,"y":0.1,"width":0,"height":0.2}}"#,
        )
        .unwrap();
        assert_eq!(zero.photo_bounding_box, None);

        let junk = parse_extraction(r#"{"name":"A","photoBoundingBox":"top-left"}"#).unwrap();
        assert_eq!(junk.photo_bounding_box, None);
    }

    #[test]
    fn parse_clamps_box_into_unit_range() {
        let fields = parse_extraction(
            r#"{"name":"A","photoBoundingBox":{"x":-0.2,"y":0.5,"width":1.4,"height":0.3}}"#,
        )
        .unwrap();
        let bbox = fields.photo_bounding_box.unwrap();
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.width, 1.0);
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_extraction("Sorry, I cannot read this card.").unwrap_err();
        assert!(matches!(err, ExtractionError::UnrecognizedResponse(_)));
        let err = parse_extraction("[1,2,3]").unwrap_err();
        assert!(matches!(err, ExtractionError::UnrecognizedResponse(_)));
    }

    #[test]
    fn classifies_structured_errors() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        assert!(matches!(
            classify_api_error(400, body),
            ExtractionError::InvalidCredential(_)
        ));

        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_api_error(429, body),
            ExtractionError::QuotaExceeded(_)
        ));

        assert!(matches!(
            classify_api_error(403, "forbidden"),
            ExtractionError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_api_error(500, "internal"),
            ExtractionError::UnrecognizedResponse(_)
        ));
    }

    #[test]
    fn classifies_by_keyword_as_fallback() {
        assert!(matches!(
            classify_message("Permission denied on resource"),
            ExtractionError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_message("You exceeded your current quota"),
            ExtractionError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_message("Failed to fetch"),
            ExtractionError::Network(_)
        ));
        assert!(matches!(
            classify_message("something odd"),
            ExtractionError::UnrecognizedResponse(_)
        ));
    }

    #[test]
    fn session_cache_reuses_and_replaces() {
        let cache: SessionCache<String> = SessionCache::new();
        let a1 = cache
            .get_or_try_insert_with("key-a", || Ok::<_, ()>("a".to_string()))
            .unwrap();
        let a2 = cache
            .get_or_try_insert_with("key-a", || Ok::<_, ()>("a-rebuilt".to_string()))
            .unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(*a2, "a");

        let b = cache
            .get_or_try_insert_with("key-b", || Ok::<_, ()>("b".to_string()))
            .unwrap();
        assert_eq!(*b, "b");

        // Capacity 1: going back to the first credential rebuilds.
        let a3 = cache
            .get_or_try_insert_with("key-a", || Ok::<_, ()>("a-again".to_string()))
            .unwrap();
        assert_eq!(*a3, "a-again");
        assert!(!Arc::ptr_eq(&a1, &a3));
    }

    #[test]
    fn session_cache_failed_init_keeps_previous() {
        let cache: SessionCache<u32> = SessionCache::new();
        cache.get_or_try_insert_with("k1", || Ok::<_, &str>(1)).unwrap();
        let err = cache.get_or_try_insert_with("k2", || Err("boom"));
        assert_eq!(err.unwrap_err(), "boom");
        let again = cache.get_or_try_insert_with("k1", || Ok::<_, &str>(99)).unwrap();
        assert_eq!(*again, 1);
    }

    #[test]
    fn credential_hash_is_stable_hex() {
        let h = credential_hash("secret");
        assert_eq!(h.len(), 64);
        assert_eq!(h, credential_hash("secret"));
        assert_ne!(h, credential_hash("secret2"));
    }

    #[test]
    fn request_carries_image_and_prompt() {
        let req = build_request(b"\xFF\xD8\xFF", "image/jpeg");
        let json = serde_json::to_value(&req).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/");
        assert!(parts[1]["text"].as_str().unwrap().contains("photoBoundingBox"));
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}
