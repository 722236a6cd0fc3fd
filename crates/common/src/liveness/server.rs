use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::codec::{read_frame, write_frame, CodecError};
use super::messages::{Request, Response};
use crate::crypto::{DerivationError, KeyPair, PublicKey};
use crate::keyring::MasterKey;
use crate::path::DerivationPath;
use crate::transport::{BoxedStream, PeerTransport, TransportError};

/// The key and path a liveness server answers as
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    path: DerivationPath,
    keypair: KeyPair,
}

impl ServerIdentity {
    /// Identity from already-derived key material, e.g. a recovered share
    pub fn new(path: DerivationPath, keypair: KeyPair) -> Result<Self, DerivationError> {
        if path.is_category() {
            return Err(DerivationError::InvalidPath(format!(
                "{} does not name a server",
                path
            )));
        }
        Ok(Self { path, keypair })
    }

    pub fn from_master(master: &MasterKey, path: &DerivationPath) -> Result<Self, DerivationError> {
        Self::new(path.clone(), master.keypair_for(path)?)
    }

    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    fn server(&self) -> String {
        self.path.server_name().unwrap_or_default().to_string()
    }

    fn category(&self) -> String {
        self.path.category_name().to_string()
    }
}

/// Answers ping, challenge and status requests as one server identity
#[derive(Debug)]
pub struct LivenessServer {
    identity: ServerIdentity,
    started: Instant,
    version: String,
}

impl LivenessServer {
    pub fn new(identity: ServerIdentity) -> Self {
        Self {
            identity,
            started: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Build the single response to `request`
    pub fn respond(&self, request: &Request) -> Response {
        let identity = &self.identity;
        match request {
            Request::Ping => Response::Pong {
                server: identity.server(),
                category: identity.category(),
                timestamp: Utc::now().timestamp_millis(),
                public_key: identity.public_key(),
            },
            Request::Challenge { nonce } => match identity.keypair.sign(nonce.as_bytes()) {
                Ok(signature) => Response::ChallengeResponse {
                    signature,
                    public_key: identity.public_key(),
                    server: identity.server(),
                    category: identity.category(),
                },
                Err(e) => {
                    tracing::error!("{} failed to sign challenge: {}", identity.path, e);
                    Response::Error {
                        message: e.to_string(),
                    }
                }
            },
            Request::Status => Response::StatusReport {
                server: identity.server(),
                category: identity.category(),
                uptime: self.started.elapsed().as_secs_f64(),
                timestamp: Utc::now().timestamp_millis(),
                version: self.version.clone(),
                public_key: identity.public_key(),
            },
        }
    }

    /// Serve requests on one connection until the peer hangs up
    async fn handle_connection(&self, mut stream: BoxedStream) -> Result<(), CodecError> {
        loop {
            let request: Request = match read_frame(&mut stream).await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(CodecError::Json(e)) => {
                    tracing::warn!("{} got a malformed request: {}", self.identity.path, e);
                    let reply = Response::Error {
                        message: format!("malformed request: {}", e),
                    };
                    write_frame(&mut stream, &reply).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::debug!("{} handling {:?}", self.identity.path, request);
            let response = self.respond(&request);
            write_frame(&mut stream, &response).await?;
        }
    }

    /// Listen on `transport` and serve connections until shutdown or until
    /// the listener is closed.
    pub async fn spawn(
        self,
        transport: Arc<dyn PeerTransport>,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let mut acceptor = transport.listen(&self.identity.keypair).await?;
        let server = Arc::new(self);
        tracing::info!(
            "liveness server {} listening as {}",
            server.identity.path,
            server.identity.public_key()
        );

        Ok(tokio::spawn(async move {
            let mut connections = Vec::new();
            loop {
                tokio::select! {
                    accepted = acceptor.accept() => match accepted {
                        Ok(stream) => {
                            let server = server.clone();
                            connections.push(tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    tracing::debug!("{} connection ended: {}", server.identity.path, e);
                                }
                            }));
                            connections.retain(|handle: &JoinHandle<()>| !handle.is_finished());
                        }
                        Err(e) => {
                            tracing::info!("liveness server {} stopped accepting: {}", server.identity.path, e);
                            break;
                        }
                    },
                    _ = shutdown_rx.changed() => {
                        tracing::info!("liveness server {} shutting down", server.identity.path);
                        break;
                    }
                }
            }
            for handle in connections {
                handle.abort();
            }
        }))
    }
}
