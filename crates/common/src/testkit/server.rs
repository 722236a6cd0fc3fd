use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::crypto::{KeyPair, PublicKey};
use crate::keyring::MasterKey;
use crate::liveness::{LivenessServer, ServerIdentity};
use crate::path::DerivationPath;
use crate::transport::{MemoryTransport, PeerTransport};

/// A server in a [`super::TestFleet`]
pub struct TestServer {
    identity: ServerIdentity,
    keypair: KeyPair,
    task: Option<JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn new(master: &MasterKey, path: &DerivationPath) -> Result<Self> {
        Ok(Self {
            identity: ServerIdentity::from_master(master, path)?,
            keypair: master.keypair_for(path)?,
            task: None,
        })
    }

    pub fn path(&self) -> &DerivationPath {
        self.identity.path()
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start answering liveness requests
    pub(crate) async fn start(
        &mut self,
        transport: &MemoryTransport,
        shutdown_rx: watch::Receiver<()>,
    ) -> Result<()> {
        if self.is_running() {
            return Err(anyhow!("server {} already started", self.path()));
        }
        let transport: Arc<dyn PeerTransport> = Arc::new(transport.clone());
        let server = LivenessServer::new(self.identity.clone());
        self.task = Some(server.spawn(transport, shutdown_rx).await?);
        Ok(())
    }

    /// Accept connections but never answer them
    pub(crate) async fn start_silent(
        &mut self,
        transport: &MemoryTransport,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<()> {
        if self.is_running() {
            return Err(anyhow!("server {} already started", self.path()));
        }
        let mut acceptor = transport.listen(&self.keypair).await?;
        let path = self.path().clone();
        self.task = Some(tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                tokio::select! {
                    accepted = acceptor.accept() => match accepted {
                        Ok(stream) => held.push(stream),
                        Err(_) => break,
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("silent server {} dropping {} connections", path, held.len());
        }));
        Ok(())
    }

    /// Wait for the server task to exit
    pub(crate) async fn join(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}
