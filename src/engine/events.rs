// src/engine/events.rs

//! Outbound event stream for status observers.

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::engine::runtime::Progress;
use crate::errors::UnitError;
use crate::lang::Value;
use crate::types::{UnitId, UnitStatus};

/// An observable change, in the order the runtime applied it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    Status {
        unit: UnitId,
        status: UnitStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<UnitError>,
    },
    /// A run published; emitted right after the unit's `idle` status.
    Output { unit: UnitId, value: Value },
    Console { unit: UnitId, line: String },
    Removed { unit: UnitId },
    CompletionToggled { enabled: bool },
    PassFinished { pass_id: u64 },
}

/// Infinite stream of [`KernelEvent`]s for one subscriber.
///
/// A subscriber that falls behind skips the events it missed and carries on
/// from the oldest one still buffered. Calling `subscribe_status` again
/// starts a fresh stream.
#[derive(Debug)]
pub struct StatusSubscription {
    rx: broadcast::Receiver<KernelEvent>,
    progress: watch::Receiver<Progress>,
}

impl StatusSubscription {
    pub(crate) fn new(
        rx: broadcast::Receiver<KernelEvent>,
        progress: watch::Receiver<Progress>,
    ) -> Self {
        Self { rx, progress }
    }

    /// Next event, or `None` once the kernel has shut down and every
    /// buffered event has been read.
    pub async fn next(&mut self) -> Option<KernelEvent> {
        loop {
            tokio::select! {
                biased;
                received = self.rx.recv() => match received {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "status subscriber lagged; skipping ahead");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                () = wait_stopped(&mut self.progress) => {}
            }
            return self.try_next();
        }
    }

    /// Next event if one is already buffered.
    pub fn try_next(&mut self) -> Option<KernelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "status subscriber lagged; skipping ahead");
                }
                Err(_) => return None,
            }
        }
    }
}

async fn wait_stopped(progress: &mut watch::Receiver<Progress>) {
    // A dropped sender means the runtime is gone as well.
    let _ = progress.wait_for(|p| p.stopped).await;
}
