// src/exec/mod.rs

//! Unit execution layer.
//!
//! This module is responsible for actually running unit bodies and reporting
//! back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `UnitExecutor` trait and the `UnitOutcome`
//!   type; tests can plug in their own executor.
//! - [`script`] is the production executor built on the interpreter.
//! - [`runner`] spawns one Tokio task per run and owns its cancellation
//!   token.

pub mod backend;
pub mod runner;
pub mod script;

pub use backend::{UnitExecutor, UnitOutcome};
pub use runner::{ActiveRun, spawn_unit};
pub use script::ScriptExecutor;
