// src/config/mod.rs

//! Notebook configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a notebook file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    CellConfig, CompletionConfig, NotebookConfig, RawConfigFile, RuntimeConfig, RuntimeSection,
    UserConfig,
};
pub use validate::syntax_report;
