#![allow(dead_code)]

use celldag::config::{
    CellConfig, CompletionConfig, NotebookConfig, RawConfigFile, RuntimeSection, UserConfig,
};
use celldag::engine::{ControlRequest, Envelope, RuntimeEvent};
use celldag::exec::UnitOutcome;
use celldag::lang::{EvalError, Evaluation, Value};
use celldag::types::{OnCellChange, UnitId};

/// Builder for `NotebookConfig` to simplify test setup.
pub struct NotebookBuilder {
    config: RawConfigFile,
}

impl NotebookBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                runtime: RuntimeSection::default(),
                completion: CompletionConfig::default(),
                cell: Vec::new(),
            },
        }
    }

    pub fn cell(mut self, code: &str) -> Self {
        self.config.cell.push(CellConfig {
            code: code.to_string(),
            disabled: false,
        });
        self
    }

    pub fn disabled_cell(mut self, code: &str) -> Self {
        self.config.cell.push(CellConfig {
            code: code.to_string(),
            disabled: true,
        });
        self
    }

    pub fn lazy(mut self) -> Self {
        self.config.runtime.on_cell_change = OnCellChange::Lazy;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.runtime.queue_capacity = capacity;
        self
    }

    pub fn copilot(mut self, enabled: bool) -> Self {
        self.config.completion.copilot = enabled;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> NotebookConfig {
        NotebookConfig::try_from(self.config).expect("Failed to build valid notebook from builder")
    }
}

impl Default for NotebookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the runtime-adjustable `UserConfig`.
#[derive(Default)]
pub struct UserConfigBuilder {
    config: UserConfig,
}

impl UserConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self) -> Self {
        self.config.runtime.on_cell_change = OnCellChange::Lazy;
        self
    }

    pub fn auto_instantiate(mut self, val: bool) -> Self {
        self.config.runtime.auto_instantiate = val;
        self
    }

    pub fn copilot(mut self, val: bool) -> Self {
        self.config.completion.copilot = val;
        self
    }

    pub fn build(self) -> UserConfig {
        self.config
    }
}

/// Feeds requests into a pure `CoreRuntime` with increasing sequence numbers.
#[derive(Default)]
pub struct RequestSeq {
    next: u64,
}

impl RequestSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&mut self, request: ControlRequest) -> RuntimeEvent {
        self.next += 1;
        RuntimeEvent::Request(Envelope {
            seq: self.next,
            request,
        })
    }

    pub fn create(&mut self, unit: u64, source: &str) -> RuntimeEvent {
        self.event(ControlRequest::Create {
            unit: UnitId(unit),
            source: source.to_string(),
            index: None,
            disabled: false,
        })
    }

    pub fn edit(&mut self, unit: u64, source: &str) -> RuntimeEvent {
        self.event(ControlRequest::Edit {
            unit: UnitId(unit),
            source: source.to_string(),
        })
    }
}

/// A successful run report binding `bindings` and producing no output.
pub fn completed(unit: UnitId, run_id: u64, bindings: &[(&str, i64)]) -> RuntimeEvent {
    RuntimeEvent::UnitFinished {
        unit,
        run_id,
        outcome: UnitOutcome::Completed(Evaluation {
            bindings: bindings
                .iter()
                .map(|(name, v)| (name.to_string(), Value::Int(*v)))
                .collect(),
            output: Value::None,
            console: Vec::new(),
        }),
    }
}

/// A run report for a body that raised `message`.
pub fn raised(unit: UnitId, run_id: u64, message: &str) -> RuntimeEvent {
    RuntimeEvent::UnitFinished {
        unit,
        run_id,
        outcome: UnitOutcome::Raised {
            error: EvalError::new(message),
            console: Vec::new(),
        },
    }
}

pub fn cancelled(unit: UnitId, run_id: u64) -> RuntimeEvent {
    RuntimeEvent::UnitFinished {
        unit,
        run_id,
        outcome: UnitOutcome::Cancelled,
    }
}
