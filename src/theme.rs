//! Light/dark theme preference.
//!
//! The preference lives under the `theme` key. When nothing is stored the
//! theme is derived once from the environment and the derived value is
//! persisted, so later sessions stay stable even if the terminal changes.
//!
//! Derivation order: `CARDEX_THEME` (`light`/`dark`), then the background
//! colour index in `COLORFGBG` (as set by rxvt, Konsole, iTerm2 and others),
//! then light.

use anyhow::Result;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::Theme;
use crate::store::{self, SqliteStore, Store, THEME_KEY};

/// What `cardex theme` should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeAction {
    Show,
    Toggle,
    Set(Theme),
}

/// Derive a theme from environment values.
pub fn detect_system_theme(cardex_theme: Option<&str>, colorfgbg: Option<&str>) -> Theme {
    if let Some(theme) = cardex_theme.and_then(|v| v.parse::<Theme>().ok()) {
        return theme;
    }
    // "fg;bg" or "fg;default;bg"; the last field is the background.
    let background = colorfgbg
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok());
    match background {
        Some(0..=6) | Some(8) => Theme::Dark,
        _ => Theme::Light,
    }
}

fn detect_from_env() -> Theme {
    detect_system_theme(
        std::env::var("CARDEX_THEME").ok().as_deref(),
        std::env::var("COLORFGBG").ok().as_deref(),
    )
}

/// The stored theme, deriving and persisting it with `detect` if absent.
pub async fn resolve(store: &dyn Store, detect: impl FnOnce() -> Theme) -> Result<Theme, StoreError> {
    if let Some(theme) = store::load(store, &THEME_KEY).await? {
        return Ok(theme);
    }
    let theme = detect();
    store::save(store, &THEME_KEY, &theme).await?;
    tracing::debug!(%theme, "derived theme from environment");
    Ok(theme)
}

/// Flip the theme and persist it.
pub async fn toggle(store: &dyn Store, detect: impl FnOnce() -> Theme) -> Result<Theme, StoreError> {
    let theme = resolve(store, detect).await?.toggled();
    store::save(store, &THEME_KEY, &theme).await?;
    Ok(theme)
}

pub async fn set(store: &dyn Store, theme: Theme) -> Result<(), StoreError> {
    store::save(store, &THEME_KEY, &theme).await
}

/// Run the theme command.
pub async fn run_theme(config: &Config, action: ThemeAction) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let result = match action {
        ThemeAction::Show => resolve(&store, detect_from_env).await,
        ThemeAction::Toggle => toggle(&store, detect_from_env).await,
        ThemeAction::Set(theme) => set(&store, theme).await.map(|()| theme),
    };
    store.close().await;
    println!("Theme: {}", result?);
    Ok(())
}
