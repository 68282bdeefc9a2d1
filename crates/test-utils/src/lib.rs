pub mod builders;
pub mod recording_executor;

use std::sync::Once;
use std::time::Duration;

use celldag::config::UserConfig;
use celldag::engine::RuntimeOptions;
use celldag::kernel::Kernel;
use tracing_subscriber::{EnvFilter, fmt};

pub use recording_executor::RecordingExecutor;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=celldag=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Spawn a kernel backed by a [`RecordingExecutor`] and hand both back.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_kernel(config: UserConfig) -> (Kernel, RecordingExecutor) {
    let executor = RecordingExecutor::new();
    let kernel = Kernel::spawn(
        executor.clone(),
        RuntimeOptions {
            config,
            ..RuntimeOptions::default()
        },
    );
    (kernel, executor)
}
