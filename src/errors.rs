// src/errors.rs

//! Crate-wide errors and the per-unit error taxonomy.

use serde::Serialize;
use thiserror::Error;

use crate::lang::{EvalError, SyntaxError};
use crate::types::UnitId;

#[derive(Error, Debug)]
pub enum CelldagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unit not found: {0}")]
    UnknownUnit(UnitId),

    #[error("Control queue is full; request rejected")]
    QueueFull,

    #[error("Kernel is shut down; request rejected")]
    QueueClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CelldagError>;

/// Why a unit is in `error` (or `stale`, for unresolved references).
///
/// Structural errors (`MultipleDefinition`, `Cycle`) are derived from the
/// dependency graph and block execution; `Runtime` comes from running the
/// unit body; `Syntax` is confined to the unit whose source failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitError {
    #[error("SyntaxError: {0}")]
    Syntax(SyntaxError),

    #[error("MultipleDefinitionError: '{name}' is defined by units {units:?}")]
    MultipleDefinition { name: String, units: Vec<UnitId> },

    #[error("CycleError: units {units:?} form a dependency cycle")]
    Cycle { units: Vec<UnitId> },

    #[error("RuntimeError: {0}")]
    Runtime(EvalError),

    #[error("UnresolvedReferenceError: no unit defines {names:?}")]
    UnresolvedReference { names: Vec<String> },
}

impl UnitError {
    /// Errors detected on the graph without executing code.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            UnitError::MultipleDefinition { .. } | UnitError::Cycle { .. }
        )
    }
}
