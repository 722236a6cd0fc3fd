use std::path::PathBuf;

use clap::Args;

use common::auth::{Token, TokenError};
use common::crypto::DerivationError;
use common::path::DerivationPath;
use keyring_cli::state::StateError;

use crate::cli::files::{read_json, FileError};

/// Check a bearer token's signature and expiry
#[derive(Args, Debug, Clone)]
pub struct VerifyToken {
    /// Token JSON; use --file to read it from disk instead
    #[arg(required_unless_present = "file")]
    pub token: Option<String>,

    #[arg(long, conflicts_with = "token")]
    pub file: Option<PathBuf>,

    /// Also require the token to be signed by this path's key
    #[arg(long)]
    pub path: Option<DerivationPath>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyTokenError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error("invalid token JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error("no token given")]
    MissingToken,
    #[error("token was signed by {actual}, not {path}")]
    WrongSigner { path: DerivationPath, actual: String },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for VerifyToken {
    type Error = VerifyTokenError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let token: Token = match (&self.file, &self.token) {
            (Some(file), _) => read_json(file)?,
            (None, Some(raw)) => serde_json::from_str(raw)?,
            (None, None) => return Err(VerifyTokenError::MissingToken),
        };

        let data = token.verify()?.clone();

        if let Some(path) = &self.path {
            let master = ctx.load_state()?.load_master()?;
            if master.public_key_for(path)? != token.public_key {
                return Err(VerifyTokenError::WrongSigner {
                    path: path.clone(),
                    actual: token.public_key.to_string(),
                });
            }
        }

        let expires = token
            .expires_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| token.payload.expires.to_string());
        Ok(format!(
            "Valid token from {}\nExpires: {}\nData: {}",
            token.public_key, expires, data
        ))
    }
}
