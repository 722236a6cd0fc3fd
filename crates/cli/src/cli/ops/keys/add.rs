use clap::Args;

use common::crypto::DerivationError;
use common::path::{DerivationPath, PathError};
use keyring_cli::state::StateError;

/// Add a server to the topology
#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Server path, `category/server`
    pub path: DerivationPath,

    /// Address the server's liveness responder listens on (host:port)
    #[arg(long)]
    pub addr: Option<std::net::SocketAddr>,
}

#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("{0}")]
    Path(#[from] PathError),
    #[error("derivation error: {0}")]
    Derivation(#[from] DerivationError),
    #[error("{0} names a category, not a server")]
    NotAServer(DerivationPath),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Add {
    type Error = AddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let Some(server) = self.path.server_name() else {
            return Err(AddError::NotAServer(self.path.clone()));
        };
        let mut state = ctx.load_state()?;
        let added = state
            .config
            .categories
            .add_server(self.path.category_name(), server)?;
        if let Some(addr) = self.addr {
            state.config.peers.insert(self.path.clone(), addr);
        }
        state.save_config()?;

        let master = state.load_master()?;
        let public_key = master.public_key_for(&self.path)?;
        Ok(if added {
            format!("Added {} ({})", self.path, public_key)
        } else {
            format!("{} already present ({})", self.path, public_key)
        })
    }
}
