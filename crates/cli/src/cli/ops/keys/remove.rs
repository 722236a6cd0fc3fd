use clap::Args;

use common::path::DerivationPath;
use keyring_cli::state::StateError;

/// Remove a server from the topology
#[derive(Args, Debug, Clone)]
pub struct Remove {
    /// Server path, `category/server`
    pub path: DerivationPath,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("{0} is not in the topology")]
    NotFound(DerivationPath),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Remove {
    type Error = RemoveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.load_state()?;
        let server = self.path.server_name().unwrap_or_default();
        if !state
            .config
            .categories
            .remove_server(self.path.category_name(), server)
        {
            return Err(RemoveError::NotFound(self.path.clone()));
        }
        state.config.peers.remove(&self.path);
        state.save_config()?;
        Ok(format!("Removed {}", self.path))
    }
}
