use std::path::PathBuf;

use clap::Args;

use common::access::AccessGrant;
use common::path::DerivationPath;
use common::recovery::{RecoveryError, RecoveryShare, RecoveryStore};
use keyring_cli::state::StateError;

use crate::cli::files::{read_json, write_secret_json, FileError};

/// Cut a recovery share for the holder of a grant and add it to a share store
#[derive(Args, Debug, Clone)]
pub struct Share {
    /// Path the share covers
    pub path: DerivationPath,

    /// The recipient's grant; its level decides the share kind
    #[arg(long)]
    pub grant: PathBuf,

    /// Share store file, created if missing
    #[arg(long)]
    pub store: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    File(#[from] FileError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Share {
    type Error = ShareError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let master = state.load_master()?;
        let grant: AccessGrant = read_json(&self.grant)?;

        let share = RecoveryShare::create(&master, &self.path, &grant)?;
        let kind = share.kind();

        let mut store: RecoveryStore = if self.store.exists() {
            read_json(&self.store)?
        } else {
            RecoveryStore::new()
        };
        store.insert(share);
        write_secret_json(&self.store, &store)?;

        Ok(format!(
            "Stored {} share for {} in {} ({} shares total)",
            kind,
            self.path,
            self.store.display(),
            store.len()
        ))
    }
}
