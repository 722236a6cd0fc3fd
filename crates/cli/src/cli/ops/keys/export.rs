use std::path::PathBuf;

use clap::Args;

use common::tree::PublicTree;
use keyring_cli::state::StateError;

use crate::cli::files::{write_json, FileError};

/// Export category public keys for peers that hold no secrets
#[derive(Args, Debug, Clone)]
pub struct Export {
    /// Write to a file instead of stdout
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to encode public tree: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Export {
    type Error = ExportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let master = state.load_master()?;
        let tree = PublicTree::export(&master, &state.config.categories);

        match &self.out {
            Some(path) => {
                write_json(path, &tree)?;
                Ok(format!("Wrote public tree to {}", path.display()))
            }
            None => Ok(serde_json::to_string_pretty(&tree)?),
        }
    }
}
