pub mod utils;

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize stdout logging and the panic logger.
///
/// `RUST_LOG` overrides `level`. The returned guard must be kept alive for
/// the duration of the program.
pub fn init_logging(level: tracing::Level) -> tracing_appender::non_blocking::WorkerGuard {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(env_filter);

    if let Err(e) = tracing_subscriber::registry().with(stdout_layer).try_init() {
        eprintln!("Warning: logging already initialized: {}", e);
    }

    utils::register_panic_logger();
    tracing::debug!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    stdout_guard
}

/// Wait for background tasks to finish after a shutdown signal, bounded by
/// a final timeout.
pub async fn shutdown_and_join(handles: Vec<JoinHandle<()>>) {
    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles)).await.is_err() {
        tracing::error!(
            "failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
    }
}
