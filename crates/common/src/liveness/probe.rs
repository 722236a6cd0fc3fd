use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::codec::{read_frame, write_frame, CodecError};
use super::messages::{Request, Response};
use crate::auth::{Challenge, ChallengeAuthenticator, ChallengeId};
use crate::crypto::PublicKey;
use crate::transport::{PeerTransport, TransportError};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("connection closed before a response arrived")]
    NoResponse,
    #[error("probe task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    #[default]
    Ping,
    Challenge,
    Status,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Challenge => "challenge",
            ProbeKind::Status => "status",
        })
    }
}

impl FromStr for ProbeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(ProbeKind::Ping),
            "challenge" => Ok(ProbeKind::Challenge),
            "status" => Ok(ProbeKind::Status),
            other => Err(format!("unknown probe type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub kind: ProbeKind,
    pub timeout: Duration,
    /// Cap on concurrent probes in a bulk check; `None` runs them all at once
    pub max_concurrency: Option<usize>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Ping,
            timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrency: None,
        }
    }
}

impl ProbeOptions {
    pub fn new(kind: ProbeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }
}

/// Result of one successful probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Always true; failures are errors
    pub alive: bool,
    pub response: Response,
    /// From sending the request to receiving the response
    pub latency: Duration,
    /// Set for challenge probes: whether the signature proved the key
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeTarget {
    pub label: String,
    pub public_key: PublicKey,
}

impl ProbeTarget {
    pub fn new(label: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            label: label.into(),
            public_key,
        }
    }
}

/// One entry of a bulk check, in the same position as its target
#[derive(Debug)]
pub struct BulkCheckResult {
    pub target: ProbeTarget,
    pub outcome: Result<ProbeReport, ProbeError>,
}

impl BulkCheckResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Discards an outstanding challenge when dropped
struct PendingChallenge<'a> {
    authenticator: &'a ChallengeAuthenticator,
    id: ChallengeId,
}

impl Drop for PendingChallenge<'_> {
    fn drop(&mut self) {
        self.authenticator.discard(&self.id);
    }
}

/// Sends probes over a transport
#[derive(Debug, Clone)]
pub struct Prober {
    transport: Arc<dyn PeerTransport>,
    authenticator: ChallengeAuthenticator,
}

impl Prober {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self::with_authenticator(transport, ChallengeAuthenticator::new())
    }

    pub fn with_authenticator(
        transport: Arc<dyn PeerTransport>,
        authenticator: ChallengeAuthenticator,
    ) -> Self {
        Self {
            transport,
            authenticator,
        }
    }

    pub fn authenticator(&self) -> &ChallengeAuthenticator {
        &self.authenticator
    }

    /// Send one request to `target` and wait for its response, bounded by
    /// `options.timeout`. The connection is dropped on every exit path.
    pub async fn check_aliveness(
        &self,
        target: &PublicKey,
        options: &ProbeOptions,
    ) -> Result<ProbeReport, ProbeError> {
        let challenge = match options.kind {
            ProbeKind::Challenge => Some(self.authenticator.create_challenge(Some(*target))),
            _ => None,
        };
        // drops the pending entry on every exit, including cancellation
        let _pending = challenge.as_ref().map(|challenge| PendingChallenge {
            authenticator: &self.authenticator,
            id: challenge.id.clone(),
        });

        let exchange = self.exchange(target, options.kind, challenge.as_ref());
        let outcome = match tokio::time::timeout(options.timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(options.timeout)),
        };

        let (response, latency) = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("{} probe of {} failed: {}", options.kind, target, e);
                return Err(e);
            }
        };

        let verified = challenge.map(|challenge| match &response {
            Response::ChallengeResponse {
                signature,
                public_key,
                ..
            } => self
                .authenticator
                .verify_challenge(&challenge.id, signature, public_key)
                .map_err(|e| tracing::warn!("challenge from {} not verified: {}", target, e))
                .is_ok(),
            _ => false,
        });

        tracing::debug!(
            "{} probe of {} answered with {} in {:?}",
            options.kind,
            target,
            response.kind(),
            latency
        );
        Ok(ProbeReport {
            alive: true,
            response,
            latency,
            verified,
        })
    }

    async fn exchange(
        &self,
        target: &PublicKey,
        kind: ProbeKind,
        challenge: Option<&Challenge>,
    ) -> Result<(Response, Duration), ProbeError> {
        let request = match (kind, challenge) {
            (ProbeKind::Challenge, Some(challenge)) => Request::Challenge {
                nonce: challenge.nonce,
            },
            (ProbeKind::Status, _) => Request::Status,
            _ => Request::Ping,
        };

        let mut stream = self.transport.connect(target).await?;
        let sent = Instant::now();
        write_frame(&mut stream, &request).await?;
        let response: Response = read_frame(&mut stream)
            .await?
            .ok_or(ProbeError::NoResponse)?;
        Ok((response, sent.elapsed()))
    }

    /// Probe every target concurrently.
    ///
    /// Each probe runs in its own task; a failing or hanging target only
    /// affects its own entry. Results come back in input order.
    pub async fn bulk_check(
        &self,
        targets: &[ProbeTarget],
        options: &ProbeOptions,
    ) -> Vec<BulkCheckResult> {
        let limit = options.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let prober = self.clone();
                let options = *options;
                let public_key = target.public_key;
                let limit = limit.clone();
                tokio::spawn(async move {
                    let _permit = match limit {
                        Some(limit) => Some(
                            limit
                                .acquire_owned()
                                .await
                                .map_err(|e| ProbeError::Aborted(e.to_string()))?,
                        ),
                        None => None,
                    };
                    prober.check_aliveness(&public_key, &options).await
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;
        targets
            .iter()
            .zip(joined)
            .map(|(target, joined)| BulkCheckResult {
                target: target.clone(),
                outcome: joined.unwrap_or_else(|e| Err(ProbeError::Aborted(e.to_string()))),
            })
            .collect()
    }
}
