use clap::Args;

use common::crypto::Seed;
use keyring_cli::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Import an existing master seed (hex) instead of generating one
    #[arg(long)]
    pub seed: Option<Seed>,

    /// Default log level for long-running commands
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.log_level.clone(),
            ..Default::default()
        };
        let state = AppState::init(ctx.config_path.clone(), Some(config), self.seed.clone())?;
        let master = state.load_master()?;

        Ok(format!(
            "Initialized keyring directory at {}\nMaster public key: {}",
            state.keyring_dir.display(),
            master.public_key()
        ))
    }
}
