use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of a unit. Assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution status of a unit as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Idle,
    Queued,
    Running,
    /// Skipped: an ancestor failed, a reference is unresolved, or the unit
    /// is waiting to be run in lazy mode. Keeps its last-good output.
    Stale,
    Error,
    Disabled,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStatus::Idle => "idle",
            UnitStatus::Queued => "queued",
            UnitStatus::Running => "running",
            UnitStatus::Stale => "stale",
            UnitStatus::Error => "error",
            UnitStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// What happens to descendants when a unit is edited or run.
///
/// - `Autorun`: descendants are re-executed in dependency order (default).
/// - `Lazy`: only the edited unit runs; descendants are marked stale and
///   wait for an explicit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnCellChange {
    Autorun,
    Lazy,
}

impl Default for OnCellChange {
    fn default() -> Self {
        OnCellChange::Autorun
    }
}

impl FromStr for OnCellChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "autorun" => Ok(OnCellChange::Autorun),
            "lazy" => Ok(OnCellChange::Lazy),
            other => Err(format!(
                "invalid on_cell_change: {other} (expected \"autorun\" or \"lazy\")"
            )),
        }
    }
}

/// Target of an interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptTarget {
    All,
    Unit(UnitId),
}
