//! View controller.
//!
//! The application moves between three views:
//!
//! ```text
//!            scan              capture(frame)
//!   List ──────────▶ Scanner ──────────────────▶ Form
//!    ▲  ◀──────────────┘ cancel                   │
//!    │                                            │ save / cancel
//!    └────────────────────────────────────────────┘
//!    List ── edit(card) ──▶ Form
//! ```
//!
//! [`transition`] is the pure state machine. [`Controller`] wraps it with the
//! side effects: running the scan pipeline, committing the form through the
//! [`CardRepository`], and dropping scan results that arrive after the user
//! has navigated away.

use std::sync::Arc;

use crate::capture::{encode_data_url, CaptureSession, CapturedFrame, FrameSource};
use crate::crop::Cropper;
use crate::error::{ControllerError, ExtractionError};
use crate::extract::Extractor;
use crate::models::{BusinessCard, CardFields, FieldOverrides};
use crate::repository::CardRepository;

/// The current screen.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    List,
    Scanner,
    Form(FormState),
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::List => "list",
            View::Scanner => "scanner",
            View::Form(_) => "form",
        }
    }
}

/// Whether the form creates a new card or edits an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    New,
    Editing { id: String },
}

/// A message shown on the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormError {
    pub message: String,
    /// Offer a credential reset alongside the message.
    pub credential_related: bool,
}

impl From<&ExtractionError> for FormError {
    fn from(err: &ExtractionError) -> Self {
        Self {
            message: err.to_string(),
            credential_related: err.is_credential_related(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub mode: FormMode,
    pub draft: CardFields,
    /// Extraction for this form is still in flight.
    pub loading: bool,
    pub error: Option<FormError>,
}

/// User intents.
#[derive(Debug, Clone)]
pub enum Event {
    Scan,
    Capture(CapturedFrame),
    Cancel,
    Save,
    Edit(BusinessCard),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Scan => "scan",
            Event::Capture(_) => "capture",
            Event::Cancel => "cancel",
            Event::Save => "save",
            Event::Edit(_) => "edit",
        }
    }
}

/// Compute the next view. Pairs not listed in the module docs are rejected.
pub fn transition(view: &View, event: Event) -> Result<View, ControllerError> {
    match (view, event) {
        (View::List, Event::Scan) => Ok(View::Scanner),
        (View::List, Event::Edit(card)) => Ok(View::Form(FormState {
            mode: FormMode::Editing {
                id: card.id.clone(),
            },
            draft: card.fields(),
            loading: false,
            error: None,
        })),
        (View::Scanner, Event::Capture(frame)) => Ok(View::Form(FormState {
            mode: FormMode::New,
            draft: CardFields {
                image: frame.to_data_url(),
                ..Default::default()
            },
            loading: true,
            error: None,
        })),
        (View::Scanner, Event::Cancel) => Ok(View::List),
        (View::Form(state), Event::Save) if !state.loading => Ok(View::List),
        (View::Form(_), Event::Cancel) => Ok(View::List),
        (view, event) => Err(ControllerError::InvalidTransition {
            view: view.name(),
            event: event.name(),
        }),
    }
}

// ============ Scan pipeline ============

/// Result of analyzing one captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub draft: CardFields,
    pub error: Option<FormError>,
}

/// Extraction followed by portrait cropping.
pub struct ScanPipeline {
    extractor: Arc<dyn Extractor>,
    cropper: Cropper,
}

impl ScanPipeline {
    pub fn new(extractor: Arc<dyn Extractor>, cropper: Cropper) -> Self {
        Self { extractor, cropper }
    }

    /// Run extraction, then crop to the detected portrait if there is one.
    ///
    /// Never fails: extraction errors come back in [`ScanOutcome::error`]
    /// with the raw image as the draft, and crop errors fall back to the
    /// raw image.
    pub async fn analyze(&self, frame: &CapturedFrame, credential: Option<&str>) -> ScanOutcome {
        let raw_image = frame.to_data_url();

        let extracted = match credential.filter(|c| !c.trim().is_empty()) {
            None => Err(ExtractionError::Configuration),
            Some(credential) => {
                self.extractor
                    .extract(&frame.bytes, &frame.mime_type, credential)
                    .await
            }
        };

        let extracted = match extracted {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(error = %err, "extraction failed");
                return ScanOutcome {
                    draft: CardFields {
                        image: raw_image,
                        ..Default::default()
                    },
                    error: Some(FormError::from(&err)),
                };
            }
        };

        let image = match extracted.photo_bounding_box {
            Some(bbox) => match self.cropper.crop_to_box(&frame.bytes, &bbox) {
                Ok(jpeg) => encode_data_url("image/jpeg", &jpeg),
                Err(err) => {
                    tracing::warn!(error = %err, "portrait crop failed; keeping original image");
                    raw_image
                }
            },
            None => raw_image,
        };

        ScanOutcome {
            draft: extracted.into_fields(image),
            error: None,
        }
    }
}

// ============ Controller ============

/// Identifies one scan. Results are applied only while their ticket is
/// still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket(u64);

/// Drives the views and owns the card collection.
pub struct Controller {
    view: View,
    repository: CardRepository,
    pipeline: ScanPipeline,
    scan_generation: u64,
}

impl Controller {
    pub fn new(repository: CardRepository, pipeline: ScanPipeline) -> Self {
        Self {
            view: View::List,
            repository,
            pipeline,
            scan_generation: 0,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn repository(&self) -> &CardRepository {
        &self.repository
    }

    /// The form state, when the form is showing.
    pub fn form(&self) -> Option<&FormState> {
        match &self.view {
            View::Form(state) => Some(state),
            _ => None,
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<(), ControllerError> {
        let from = self.view.name();
        let event_name = event.name();
        self.view = transition(&self.view, event)?;
        tracing::debug!(from, event = event_name, to = self.view.name(), "view transition");
        Ok(())
    }

    /// List → Scanner.
    pub fn start_scan(&mut self) -> Result<(), ControllerError> {
        self.dispatch(Event::Scan)
    }

    /// Grab one frame from `source` while the scanner or the form is
    /// showing. A failed grab cancels back to the list.
    pub fn grab_frame(
        &mut self,
        source: &mut dyn FrameSource,
    ) -> Result<CapturedFrame, ControllerError> {
        if self.view == View::List {
            return Err(ControllerError::InvalidTransition {
                view: self.view.name(),
                event: "capture",
            });
        }
        match CaptureSession::open(source).and_then(|session| session.capture()) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed");
                self.cancel()?;
                Err(ControllerError::Capture(err))
            }
        }
    }

    /// Scanner → Form with the raw frame, pending analysis.
    pub fn capture(&mut self, frame: CapturedFrame) -> Result<ScanTicket, ControllerError> {
        self.dispatch(Event::Capture(frame))?;
        self.scan_generation += 1;
        Ok(ScanTicket(self.scan_generation))
    }

    /// Apply a scan result to the form. Returns `false` (and does nothing)
    /// when the ticket is stale.
    pub fn apply_scan(&mut self, ticket: ScanTicket, outcome: ScanOutcome) -> bool {
        if ticket.0 != self.scan_generation {
            tracing::debug!(ticket = ticket.0, "dropping stale scan result");
            return false;
        }
        match &mut self.view {
            View::Form(state) if state.mode == FormMode::New && state.loading => {
                state.draft = outcome.draft;
                state.error = outcome.error;
                state.loading = false;
                true
            }
            _ => {
                tracing::debug!(ticket = ticket.0, "dropping scan result for inactive form");
                false
            }
        }
    }

    /// Capture `frame` and analyze it. The view ends on the form, pre-filled
    /// on success or carrying an error message on failure.
    pub async fn process_capture(
        &mut self,
        frame: CapturedFrame,
        credential: Option<&str>,
    ) -> Result<(), ControllerError> {
        let ticket = self.capture(frame.clone())?;
        let outcome = self.pipeline.analyze(&frame, credential).await;
        self.apply_scan(ticket, outcome);
        Ok(())
    }

    /// List → Form pre-filled with card `id`.
    pub fn edit(&mut self, id: &str) -> Result<(), ControllerError> {
        let card = self
            .repository
            .get(id)
            .cloned()
            .ok_or_else(|| ControllerError::CardNotFound(id.to_string()))?;
        self.dispatch(Event::Edit(card))
    }

    /// Apply field overrides to the form draft.
    pub fn update_draft(&mut self, overrides: &FieldOverrides) -> Result<(), ControllerError> {
        let state = self.form_mut("update")?;
        overrides.apply_to(&mut state.draft);
        Ok(())
    }

    /// Replace the draft image.
    pub fn set_draft_image(&mut self, frame: &CapturedFrame) -> Result<(), ControllerError> {
        let state = self.form_mut("update")?;
        state.draft.image = frame.to_data_url();
        Ok(())
    }

    fn form_mut(&mut self, event: &'static str) -> Result<&mut FormState, ControllerError> {
        match &mut self.view {
            View::Form(state) => Ok(state),
            other => Err(ControllerError::InvalidTransition {
                view: other.name(),
                event,
            }),
        }
    }

    /// Validate and commit the form, then return to the list.
    pub async fn save(&mut self) -> Result<BusinessCard, ControllerError> {
        let Some(state) = self.form().cloned() else {
            return Err(ControllerError::InvalidTransition {
                view: self.view.name(),
                event: Event::Save.name(),
            });
        };
        // Surface a pending-extraction rejection before field validation.
        transition(&self.view, Event::Save)?;

        let mut draft = state.draft;
        draft.name = draft.name.trim().to_string();
        if draft.name.is_empty() {
            return Err(ControllerError::MissingField("name"));
        }
        if draft.image.is_empty() {
            return Err(ControllerError::MissingField("image"));
        }

        let card = match state.mode {
            FormMode::New => self.repository.create(draft).await?,
            FormMode::Editing { id } => self
                .repository
                .update(&id, draft)
                .await?
                .ok_or(ControllerError::CardNotFound(id))?,
        };
        self.dispatch(Event::Save)?;
        Ok(card)
    }

    /// Leave the scanner or form without saving.
    pub fn cancel(&mut self) -> Result<(), ControllerError> {
        self.dispatch(Event::Cancel)?;
        // Invalidate any scan still in flight.
        self.scan_generation += 1;
        Ok(())
    }

    /// Delete card `id` from the list view. Returns whether it existed.
    pub async fn delete(&mut self, id: &str) -> Result<bool, ControllerError> {
        if self.view != View::List {
            return Err(ControllerError::InvalidTransition {
                view: self.view.name(),
                event: "delete",
            });
        }
        Ok(self.repository.delete(id).await?)
    }
}
