// src/config/loader.rs

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::model::Settings;
use crate::config::validate::validate_settings;
use crate::errors::Result;

/// Load and validate settings from a TOML file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let settings: Settings = toml::from_str(&contents)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Load settings, falling back to built-in defaults when the file does
/// not exist. This is the entry point `run()` uses: a missing settings
/// file is a warning, not an error.
pub fn load_settings_or_default(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    if path.exists() {
        load_settings(path)
    } else {
        warn!(path = %path.display(), "settings file does not exist; using defaults");
        Ok(Settings::default())
    }
}

/// Default settings path: `Crondag.toml` in the current working directory.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("Crondag.toml")
}
