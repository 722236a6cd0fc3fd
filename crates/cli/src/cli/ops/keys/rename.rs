use std::collections::BTreeMap;

use clap::Args;

use common::path::{DerivationPath, PathError};
use keyring_cli::state::StateError;

/// Move every server in a category to a new category name.
///
/// Server keys are derived from the category name, so every moved server
/// gets a new key.
#[derive(Args, Debug, Clone)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("{0}")]
    Path(#[from] PathError),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rename {
    type Error = RenameError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.load_state()?;
        if !state.config.categories.rename_category(&self.from, &self.to)? {
            return Err(RenameError::UnknownCategory(self.from.clone()));
        }

        // carry peer addresses over to the new paths
        let mut peers = BTreeMap::new();
        for (path, addr) in std::mem::take(&mut state.config.peers) {
            let path = match path.server_name() {
                Some(server) if path.category_name() == self.from => {
                    DerivationPath::server(self.to.as_str(), server)?
                }
                _ => path,
            };
            peers.insert(path, addr);
        }
        state.config.peers = peers;
        state.save_config()?;

        Ok(format!(
            "Renamed category {} to {}; keys for its servers have changed",
            self.from, self.to
        ))
    }
}
