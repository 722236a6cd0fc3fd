use clap::Args;

use common::crypto::DerivationError;
use keyring_cli::state::StateError;

/// Audit listing of every key in the configured topology
#[derive(Args, Debug, Clone)]
pub struct List {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("derivation error: {0}")]
    Derivation(#[from] DerivationError),
    #[error("failed to encode listing: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let master = state.load_master()?;
        let listing = master.list_keys(&state.config.categories)?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&listing)?);
        }
        if listing.categories.is_empty() {
            return Ok("No servers configured. Add one with 'keyring keys add <category/server>'".to_string());
        }
        Ok(format!("master  {}\n{}", master.public_key(), listing))
    }
}
