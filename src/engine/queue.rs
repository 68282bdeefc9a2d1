// src/engine/queue.rs

//! Control request queue.
//!
//! A bounded, single-consumer queue in front of the scheduler. Every accepted
//! request gets a sequence number; the runtime applies requests strictly in
//! that order and reports the last applied number back, which is what
//! `Kernel::wait_idle` waits on.
//!
//! Submission never blocks: a full queue rejects the request with
//! [`CelldagError::QueueFull`], a stopped runtime with
//! [`CelldagError::QueueClosed`].

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::engine::{ControlRequest, Envelope};
use crate::errors::{CelldagError, Result};

/// Create a control queue holding at most `capacity` pending requests.
///
/// `capacity` is clamped to at least 1.
pub fn control_queue(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ControlSender {
            tx,
            last_seq: Arc::new(Mutex::new(0)),
        },
        ControlReceiver { rx },
    )
}

/// Producer side; cheap to clone.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<Envelope>,
    /// Held across `try_send` so sequence numbers match queue order.
    last_seq: Arc<Mutex<u64>>,
}

impl ControlSender {
    /// Enqueue `request`, returning its sequence number.
    pub fn submit(&self, request: ControlRequest) -> Result<u64> {
        let mut last_seq = self.last_seq.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *last_seq + 1;

        match self.tx.try_send(Envelope { seq, request }) {
            Ok(()) => {
                *last_seq = seq;
                debug!(seq, "control request accepted");
                Ok(seq)
            }
            Err(TrySendError::Full(envelope)) => {
                warn!(request = ?envelope.request, "control queue full; rejecting request");
                Err(CelldagError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(CelldagError::QueueClosed),
        }
    }

    /// Sequence number of the most recently accepted request.
    pub fn last_seq(&self) -> u64 {
        *self.last_seq.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consumer side, owned by the runtime.
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl ControlReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Stop accepting new requests; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
