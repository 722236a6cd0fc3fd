use std::sync::Arc;

use clap::Args;

use common::crypto::DerivationError;
use common::liveness::{LivenessServer, ServerIdentity};
use common::path::DerivationPath;
use common::transport::{PeerTransport, TcpTransport, TransportError};
use keyring_cli::process::{init_logging, shutdown_and_join, utils::graceful_shutdown_blocker};
use keyring_cli::state::StateError;

/// Run liveness responders for servers in the topology until interrupted
#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Servers to answer for (all configured peers when empty)
    pub paths: Vec<DerivationPath>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
    #[error("no peer address configured for {0}")]
    NoAddress(DerivationPath),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let _guard = init_logging(state.config.log_level());
        let master = state.load_master()?;

        let paths = if self.paths.is_empty() {
            state.config.peers.keys().cloned().collect()
        } else {
            self.paths.clone()
        };
        if let Some(missing) = paths.iter().find(|p| !state.config.peers.contains_key(*p)) {
            return Err(ServeError::NoAddress(missing.clone()));
        }

        let transport: Arc<dyn PeerTransport> =
            Arc::new(TcpTransport::new(state.address_book(&master)?));
        let (signal_handle, _shutdown_tx, shutdown_rx) = graceful_shutdown_blocker()?;

        let version = env!("CARGO_PKG_VERSION");
        let mut handles = Vec::with_capacity(paths.len());
        for path in &paths {
            let identity = ServerIdentity::from_master(&master, path)?;
            let server = LivenessServer::new(identity).with_version(version);
            handles.push(server.spawn(transport.clone(), shutdown_rx.clone()).await?);
        }
        tracing::info!("serving {} liveness responders", handles.len());

        if let Err(e) = signal_handle.await {
            tracing::error!("signal handler failed: {}", e);
        }
        shutdown_and_join(handles).await;

        Ok(format!("Stopped {} liveness responders", paths.len()))
    }
}
