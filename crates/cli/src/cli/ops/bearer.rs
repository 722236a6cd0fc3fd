use std::time::Duration;

use clap::Args;

use common::auth::TokenError;
use common::path::DerivationPath;
use keyring_cli::state::StateError;

/// Issue a bearer token signed by the key at a path
#[derive(Args, Debug, Clone)]
pub struct Bearer {
    pub path: DerivationPath,

    /// JSON carried in the token
    #[arg(long, default_value = "{}")]
    pub data: String,

    /// Lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    pub ttl_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BearerError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("invalid token data: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Bearer {
    type Error = BearerError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let data: serde_json::Value = serde_json::from_str(&self.data)?;
        let state = ctx.load_state()?;
        let master = state.load_master()?;

        let token = master.bearer_token(&self.path, &data, Duration::from_secs(self.ttl_secs))?;
        Ok(serde_json::to_string(&token)?)
    }
}
