use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub crop: CropConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/cardex.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CropConfig {
    #[serde(default = "default_margin_ratio")]
    pub margin_ratio: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            margin_ratio: default_margin_ratio(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_margin_ratio() -> f64 {
    0.2
}
fn default_jpeg_quality() -> u8 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            extraction: ExtractionConfig::default(),
            crop: CropConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate extraction
    if config.extraction.model.trim().is_empty() {
        anyhow::bail!("extraction.model must not be empty");
    }
    if !config.extraction.base_url.starts_with("http://")
        && !config.extraction.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "extraction.base_url must be an http(s) URL, got '{}'",
            config.extraction.base_url
        );
    }
    if config.extraction.timeout_secs == 0 {
        anyhow::bail!("extraction.timeout_secs must be > 0");
    }

    // Validate crop
    if !(0.0..=1.0).contains(&config.crop.margin_ratio) {
        anyhow::bail!("crop.margin_ratio must be in [0.0, 1.0]");
    }
    if !(1..=100).contains(&config.crop.jpeg_quality) {
        anyhow::bail!("crop.jpeg_quality must be in 1..=100");
    }

    match config.logging.level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        other => anyhow::bail!(
            "Unknown logging.level: '{}'. Must be error, warn, info, debug, or trace.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(body: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cardex.toml");
        fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.extraction.model, "gemini-2.5-flash");
        assert_eq!(cfg.crop.jpeg_quality, 90);
        assert!((cfg.crop.margin_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.logging.level, "warn");
    }

    #[test]
    fn partial_sections_are_filled() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/cards.sqlite"

[extraction]
model = "gemini-2.0-flash"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("/tmp/cards.sqlite"));
        assert_eq!(cfg.extraction.model, "gemini-2.0-flash");
        assert_eq!(cfg.extraction.timeout_secs, 60);
    }

    #[test]
    fn rejects_out_of_range_margin() {
        let (_tmp, path) = write_config("[crop]\nmargin_ratio = 1.5\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("margin_ratio"));
    }

    #[test]
    fn rejects_bad_quality_and_level() {
        let (_tmp, path) = write_config("[crop]\njpeg_quality = 0\n");
        assert!(load_config(&path).is_err());

        let (_tmp, path) = write_config("[logging]\nlevel = \"loud\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_minimal() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_or_default(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("./data/cardex.sqlite"));
    }
}
