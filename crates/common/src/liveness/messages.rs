use serde::{Deserialize, Serialize};

use crate::auth::Nonce;
use crate::crypto::{signature_hex, PublicKey, Signature};

/// Sent by a prober
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    Ping,
    Challenge { nonce: Nonce },
    Status,
}

/// Sent by a liveness server, exactly one per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Response {
    Pong {
        server: String,
        category: String,
        /// unix milliseconds
        timestamp: i64,
        public_key: PublicKey,
    },
    ChallengeResponse {
        #[serde(with = "signature_hex")]
        signature: Signature,
        public_key: PublicKey,
        server: String,
        category: String,
    },
    StatusReport {
        server: String,
        category: String,
        /// seconds since the server started
        uptime: f64,
        timestamp: i64,
        version: String,
        public_key: PublicKey,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Pong { .. } => "pong",
            Response::ChallengeResponse { .. } => "challenge-response",
            Response::StatusReport { .. } => "status-report",
            Response::Error { .. } => "error",
        }
    }

    /// The key the responder claims to hold
    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            Response::Pong { public_key, .. }
            | Response::ChallengeResponse { public_key, .. }
            | Response::StatusReport { public_key, .. } => Some(*public_key),
            Response::Error { .. } => None,
        }
    }
}
