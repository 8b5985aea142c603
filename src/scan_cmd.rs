//! `cardex scan`: capture a card image, extract its fields, and save it.
//!
//! Walks the controller through List → Scanner → Form → List. Field flags
//! given on the command line are applied to the form after extraction, so
//! they can fill in or correct what the model returned.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::capture::FileFrameSource;
use crate::config::Config;
use crate::controller::{Controller, ScanPipeline};
use crate::credential;
use crate::crop::Cropper;
use crate::error::ControllerError;
use crate::extract::GeminiExtractor;
use crate::get::print_fields;
use crate::models::FieldOverrides;
use crate::repository::CardRepository;
use crate::store::SqliteStore;

/// Run the scan command.
pub async fn run_scan(
    config: &Config,
    image: &Path,
    overrides: &FieldOverrides,
    dry_run: bool,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let result = scan_with_store(config, store.clone(), image, overrides, dry_run).await;
    store.close().await;
    result
}

async fn scan_with_store(
    config: &Config,
    store: Arc<SqliteStore>,
    image: &Path,
    overrides: &FieldOverrides,
    dry_run: bool,
) -> Result<()> {
    let key = credential::get(store.as_ref()).await?;
    let repository = CardRepository::load(store).await?;

    let extractor = GeminiExtractor::new(config.extraction.clone());
    tracing::info!(model = extractor.model_name(), image = %image.display(), "scanning card");
    let pipeline = ScanPipeline::new(Arc::new(extractor), Cropper::new(&config.crop));
    let mut controller = Controller::new(repository, pipeline);

    controller.start_scan()?;
    let mut source = FileFrameSource::new(image);
    let frame = controller.grab_frame(&mut source)?;

    println!("Analyzing {} ...", image.display());
    controller.process_capture(frame, key.as_deref()).await?;
    controller.update_draft(overrides)?;

    let Some(form) = controller.form() else {
        bail!("scan did not reach the form view");
    };
    if let Some(error) = &form.error {
        println!("{}", error.message);
        if error.credential_related {
            println!("To replace the API key, run `cardex key reset` then `cardex key set <KEY>`.");
        }
    }
    println!();
    print_fields(&form.draft);
    println!();

    if dry_run {
        controller.cancel()?;
        println!("Dry run: card not saved.");
        return Ok(());
    }

    match controller.save().await {
        Ok(card) => {
            println!("Saved card {} ({}).", card.id, card.name);
            Ok(())
        }
        Err(ControllerError::MissingField(field)) => {
            bail!(
                "Card not saved: {} is required. Pass --{} to provide it.",
                field,
                field
            )
        }
        Err(e) => Err(e.into()),
    }
}
