use std::path::PathBuf;

use clap::Args;

use common::access::{AccessError, AccessGrant, AccessLevel, GrantRequest};
use common::path::DerivationPath;
use keyring_cli::state::StateError;

use crate::cli::files::{read_json, write_secret_json, FileError};

/// Issue an access grant, or delegate one from an existing grant
#[derive(Args, Debug, Clone)]
pub struct Grant {
    /// Path the grant covers
    pub path: DerivationPath,

    /// none, public-only, category-read, category-sign or full-control
    #[arg(long, short)]
    pub level: AccessLevel,

    /// Delegate from this grant instead of the master key
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Where to write the grant (stdout when unset)
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to encode grant: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Grant {
    type Error = GrantError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let grant = match &self.from {
            Some(source) => {
                let held: AccessGrant = read_json(source)?;
                held.delegate(&GrantRequest::new(self.level, self.path.clone()))?
            }
            None => {
                let state = ctx.load_state()?;
                let master = state.load_master()?;
                AccessGrant::issue(&master, &self.path, self.level)?
            }
        };

        match &self.out {
            Some(out) => {
                write_secret_json(out, &grant)?;
                Ok(format!(
                    "Wrote {} grant for {} to {}",
                    grant.level(),
                    self.path,
                    out.display()
                ))
            }
            None => Ok(serde_json::to_string_pretty(&grant)?),
        }
    }
}
