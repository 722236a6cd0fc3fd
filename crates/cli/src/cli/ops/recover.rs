use std::path::PathBuf;

use clap::Args;

use common::access::AccessGrant;
use common::path::DerivationPath;
use common::recovery::{RecoveryError, RecoveryStore};

use crate::cli::files::{read_json, FileError};

/// Redeem a recovery share from a store using a grant.
///
/// Prints what the share recovers; secret material is never printed.
#[derive(Args, Debug, Clone)]
pub struct Recover {
    /// Path the share was cut at
    pub path: DerivationPath,

    #[arg(long)]
    pub grant: PathBuf,

    #[arg(long)]
    pub store: PathBuf,

    /// Resolve a key other than `path` within the share's scope
    #[arg(long)]
    pub target: Option<DerivationPath>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecoverError {
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    File(#[from] FileError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Recover {
    type Error = RecoverError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let grant: AccessGrant = read_json(&self.grant)?;
        let store: RecoveryStore = read_json(&self.store)?;

        let share = store.request(&self.path, &grant)?;
        let target = self.target.as_ref().unwrap_or(&self.path);
        let public_key = share.public_key_for(target)?;
        let can_sign = share.keypair_for(target).is_ok();

        Ok(format!(
            "Recovered {} share for {}\n{}  {}  ({})",
            share.kind(),
            self.path,
            target,
            public_key,
            if can_sign { "signing key available" } else { "public only" }
        ))
    }
}
