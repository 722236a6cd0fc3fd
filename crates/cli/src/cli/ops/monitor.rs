use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use common::crypto::DerivationError;
use common::liveness::{Monitor as LivenessMonitor, ProbeTarget, Prober, ServerStatus};
use common::path::DerivationPath;
use common::transport::TcpTransport;
use keyring_cli::process::{init_logging, utils::graceful_shutdown_blocker};
use keyring_cli::state::StateError;

/// Probe servers on an interval and log status changes until interrupted
#[derive(Args, Debug, Clone)]
pub struct Monitor {
    /// Servers to watch (every server in the topology when empty)
    pub targets: Vec<DerivationPath>,

    /// Sweep interval, overriding the config
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
    #[error("no servers to monitor")]
    NoTargets,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Monitor {
    type Error = MonitorError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let _guard = init_logging(state.config.log_level());
        let master = state.load_master()?;

        let paths = state.resolve_targets(&self.targets)?;
        if paths.is_empty() {
            return Err(MonitorError::NoTargets);
        }
        let targets = paths
            .iter()
            .map(|path| Ok(ProbeTarget::new(path.to_string(), master.public_key_for(path)?)))
            .collect::<Result<Vec<_>, DerivationError>>()?;

        let interval = self
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| state.config.probe.interval());
        let prober = Prober::new(Arc::new(TcpTransport::new(state.address_book(&master)?)));
        let monitor = LivenessMonitor::new(prober, targets, state.config.probe.options());

        let (mut signal_handle, _shutdown_tx, _shutdown_rx) = graceful_shutdown_blocker()?;
        tracing::info!("monitoring {} servers every {:?}", paths.len(), interval);
        let handle = monitor.start(interval).await;

        let mut last: Vec<ServerStatus> = Vec::new();
        let mut report = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = report.tick() => {
                    let records = handle.records();
                    for (i, (target, record)) in records.iter().enumerate() {
                        if last.get(i) == Some(&record.status) {
                            continue;
                        }
                        match record.status {
                            ServerStatus::Online => tracing::info!(
                                server = %target.label,
                                latency_ms = record.latency.map(|l| l.as_millis() as u64),
                                "online"
                            ),
                            ServerStatus::Offline => tracing::warn!(
                                server = %target.label,
                                failures = record.consecutive_failures,
                                error = record.last_error.as_deref().unwrap_or(""),
                                "offline"
                            ),
                            ServerStatus::Unknown => {}
                        }
                    }
                    last = records.into_iter().map(|(_, record)| record.status).collect();
                }
                _ = &mut signal_handle => break,
            }
        }

        let online = last.iter().filter(|s| **s == ServerStatus::Online).count();
        handle.stop().await;
        Ok(format!("Monitor stopped; {}/{} servers online at last sweep", online, last.len()))
    }
}
