//! `cardex edit` and `cardex delete`.
//!
//! Both open the store, drive the controller, and close the store on every
//! exit path before reporting the outcome.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::capture::FileFrameSource;
use crate::config::Config;
use crate::controller::{Controller, ScanPipeline};
use crate::crop::Cropper;
use crate::extract::GeminiExtractor;
use crate::get::print_fields;
use crate::models::FieldOverrides;
use crate::prompt;
use crate::repository::CardRepository;
use crate::store::SqliteStore;

async fn open_controller(config: &Config, store: Arc<SqliteStore>) -> Result<Controller> {
    let repository = CardRepository::load(store).await?;
    let pipeline = ScanPipeline::new(
        Arc::new(GeminiExtractor::new(config.extraction.clone())),
        Cropper::new(&config.crop),
    );
    Ok(Controller::new(repository, pipeline))
}

/// Edit an existing card: List → Form(edit) → List.
pub async fn run_edit(
    config: &Config,
    id: &str,
    overrides: &FieldOverrides,
    image: Option<&Path>,
) -> Result<()> {
    if overrides.is_empty() && image.is_none() {
        bail!("nothing to change: pass at least one field flag or --image");
    }

    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let result = edit_with_store(config, store.clone(), id, overrides, image).await;
    store.close().await;
    result
}

async fn edit_with_store(
    config: &Config,
    store: Arc<SqliteStore>,
    id: &str,
    overrides: &FieldOverrides,
    image: Option<&Path>,
) -> Result<()> {
    let mut controller = open_controller(config, store).await?;
    controller.edit(id)?;

    if let Some(path) = image {
        let mut source = FileFrameSource::new(path);
        let frame = controller.grab_frame(&mut source)?;
        controller.set_draft_image(&frame)?;
    }
    controller.update_draft(overrides)?;

    let card = controller.save().await?;
    println!("Updated card {}.", card.id);
    print_fields(&card.fields());
    Ok(())
}

/// Delete a card after confirmation (skipped with `--yes`).
pub async fn run_delete(config: &Config, id: &str, yes: bool) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db.path).await?);
    let result = delete_with_store(config, store.clone(), id, yes).await;
    store.close().await;
    result
}

async fn delete_with_store(
    config: &Config,
    store: Arc<SqliteStore>,
    id: &str,
    yes: bool,
) -> Result<()> {
    let mut controller = open_controller(config, store).await?;

    let Some(card) = controller.repository().get(id).cloned() else {
        bail!("card not found: {}", id);
    };

    if !yes && !prompt::confirm(&format!("Delete card '{}' ({})?", card.name, card.id))? {
        println!("Cancelled.");
        return Ok(());
    }

    controller.delete(id).await?;
    println!("Deleted card {} ({}).", card.id, card.name);
    Ok(())
}
