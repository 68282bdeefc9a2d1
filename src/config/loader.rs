// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{NotebookConfig, RawConfigFile};
use crate::errors::Result;

/// Load a notebook file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a notebook file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<NotebookConfig> {
    let raw_config = load_from_path(&path)?;
    let config = NotebookConfig::try_from(raw_config)?;
    Ok(config)
}
