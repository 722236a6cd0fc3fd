use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::watch;

use super::server::TestServer;
use crate::keyring::MasterKey;
use crate::liveness::{ProbeTarget, Prober};
use crate::path::DerivationPath;
use crate::transport::{MemoryTransport, PeerTransport};
use crate::tree::Topology;

/// A set of in-process liveness servers sharing one memory transport
pub struct TestFleet {
    master: MasterKey,
    transport: MemoryTransport,
    servers: BTreeMap<DerivationPath, TestServer>,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
}

impl TestFleet {
    /// An empty fleet under a fresh master key
    pub fn new() -> Self {
        Self::with_master(MasterKey::generate())
    }

    pub fn with_master(master: MasterKey) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        Self {
            master,
            transport: MemoryTransport::new(),
            servers: BTreeMap::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Start a server for every path in `topology`
    pub async fn from_topology(topology: &Topology) -> Result<Self> {
        let mut fleet = Self::new();
        for path in topology.paths()? {
            fleet.add_server(&path).await?;
        }
        Ok(fleet)
    }

    pub async fn from_paths(paths: &[&str]) -> Result<Self> {
        let mut fleet = Self::new();
        for path in paths {
            fleet.add_server(&path.parse()?).await?;
        }
        Ok(fleet)
    }

    /// Add and start a server answering as `path`
    pub async fn add_server(&mut self, path: &DerivationPath) -> Result<()> {
        let mut server = self.new_server(path)?;
        server.start(&self.transport, self.shutdown_rx.clone()).await?;
        tracing::debug!("test fleet started {}", path);
        self.servers.insert(path.clone(), server);
        Ok(())
    }

    /// Add a server that accepts connections and never answers
    pub async fn add_silent_server(&mut self, path: &DerivationPath) -> Result<()> {
        let mut server = self.new_server(path)?;
        server
            .start_silent(&self.transport, self.shutdown_rx.clone())
            .await?;
        self.servers.insert(path.clone(), server);
        Ok(())
    }

    fn new_server(&self, path: &DerivationPath) -> Result<TestServer> {
        if self.servers.contains_key(path) {
            return Err(anyhow!("server {} already exists", path));
        }
        TestServer::new(&self.master, path)
    }

    pub fn master(&self) -> &MasterKey {
        &self.master
    }

    pub fn transport(&self) -> Arc<dyn PeerTransport> {
        Arc::new(self.transport.clone())
    }

    pub fn server(&self, path: &str) -> Option<&TestServer> {
        let path: DerivationPath = path.parse().ok()?;
        self.servers.get(&path)
    }

    /// Take a server off the transport and wait for it to stop
    pub async fn kill(&mut self, path: &str) -> Result<()> {
        let path: DerivationPath = path.parse()?;
        let server = self
            .servers
            .get_mut(&path)
            .ok_or_else(|| anyhow!("no server at {}", path))?;
        self.transport.disconnect(&server.public_key());
        server.join().await?;
        tracing::debug!("test fleet killed {}", path);
        Ok(())
    }

    /// Bring a killed server back on the transport
    pub async fn revive(&mut self, path: &str) -> Result<()> {
        let path: DerivationPath = path.parse()?;
        let server = self
            .servers
            .get_mut(&path)
            .ok_or_else(|| anyhow!("no server at {}", path))?;
        server.start(&self.transport, self.shutdown_rx.clone()).await
    }

    /// Probe targets for every server, in path order
    pub fn targets(&self) -> Vec<ProbeTarget> {
        self.servers
            .values()
            .map(|server| ProbeTarget::new(server.path().to_string(), server.public_key()))
            .collect()
    }

    pub fn prober(&self) -> Prober {
        Prober::new(self.transport())
    }

    /// Stop every server
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        for server in self.servers.values_mut() {
            server.join().await?;
        }
        Ok(())
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}
