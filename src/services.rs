// src/services.rs

//! Host-side interactive services.
//!
//! The scheduler never starts or stops side-services itself; it only reports
//! that the completion toggle changed. A [`ServiceHost`] listens on the
//! kernel's event stream and reacts to those reports.

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::KernelEvent;
use crate::kernel::Kernel;

/// Something that can start and stop the completion side-service.
pub trait ServiceHost: Send + 'static {
    fn start_completion(&mut self) -> Result<()>;
    fn stop_completion(&mut self) -> Result<()>;
}

/// Default host: tracks whether the service should be running and logs
/// transitions. Stands in where no language server is wired up.
#[derive(Debug, Default)]
pub struct LoggingServiceHost {
    running: bool,
}

impl LoggingServiceHost {
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl ServiceHost for LoggingServiceHost {
    fn start_completion(&mut self) -> Result<()> {
        if !self.running {
            info!("starting completion service");
            self.running = true;
        }
        Ok(())
    }

    fn stop_completion(&mut self) -> Result<()> {
        if self.running {
            info!("stopping completion service");
            self.running = false;
        }
        Ok(())
    }
}

/// Drive `host` from the kernel's completion toggles until the kernel shuts
/// down, then hand the host back.
///
/// When `initially_enabled` is set the service is started before any event
/// is read. Host failures are logged and never reach the scheduler.
pub fn spawn_service_watcher<H: ServiceHost>(
    kernel: &Kernel,
    mut host: H,
    initially_enabled: bool,
) -> JoinHandle<H> {
    let mut events = kernel.subscribe_status();

    tokio::spawn(async move {
        if initially_enabled {
            apply_toggle(&mut host, true);
        }

        while let Some(event) = events.next().await {
            if let KernelEvent::CompletionToggled { enabled } = event {
                apply_toggle(&mut host, enabled);
            }
        }

        debug!("service watcher finished (kernel closed)");
        host
    })
}

fn apply_toggle<H: ServiceHost>(host: &mut H, enabled: bool) {
    let result = if enabled {
        host.start_completion()
    } else {
        host.stop_completion()
    };
    if let Err(err) = result {
        error!(enabled, error = %err, "completion service toggle failed");
    }
}
