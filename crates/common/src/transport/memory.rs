use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use super::{Acceptor, BoxedStream, PeerTransport, TransportError};
use crate::crypto::{KeyPair, PublicKey};

const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

type Listeners = Arc<Mutex<HashMap<PublicKey, mpsc::UnboundedSender<DuplexStream>>>>;

/// In-process transport over tokio duplex pipes.
///
/// Clones share one routing table, so a server and its probes must use
/// clones of the same transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    listeners: Listeners,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the listener for `public_key`, making the peer unreachable.
    ///
    /// Connections that are already open are left alone.
    pub fn disconnect(&self, public_key: &PublicKey) -> bool {
        self.listeners.lock().remove(public_key).is_some()
    }

    pub fn is_listening(&self, public_key: &PublicKey) -> bool {
        self.listeners
            .lock()
            .get(public_key)
            .is_some_and(|tx| !tx.is_closed())
    }
}

struct MemoryAcceptor {
    public_key: PublicKey,
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Result<BoxedStream, TransportError> {
        match self.incoming.recv().await {
            Some(stream) => Ok(Box::new(stream)),
            None => {
                tracing::debug!("memory listener for {} closed", self.public_key);
                Err(TransportError::Closed)
            }
        }
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn listen(&self, keypair: &KeyPair) -> Result<Box<dyn Acceptor>, TransportError> {
        let public_key = keypair.public_key();
        let mut listeners = self.listeners.lock();
        if listeners.get(&public_key).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::AddressInUse(public_key));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        listeners.insert(public_key, tx);
        Ok(Box::new(MemoryAcceptor {
            public_key,
            incoming: rx,
        }))
    }

    async fn connect(&self, public_key: &PublicKey) -> Result<BoxedStream, TransportError> {
        let tx = self
            .listeners
            .lock()
            .get(public_key)
            .cloned()
            .ok_or(TransportError::Unreachable(*public_key))?;
        let (local, remote) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);
        tx.send(remote)
            .map_err(|_| TransportError::Unreachable(*public_key))?;
        Ok(Box::new(local))
    }
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::crypto::Seed;

    #[tokio::test]
    async fn test_connect_and_accept() {
        let transport = MemoryTransport::new();
        let keypair = KeyPair::from_seed(&Seed::generate());
        let mut acceptor = transport.listen(&keypair).await.unwrap();

        let mut client = transport.connect(&keypair.public_key()).await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_unknown_peer_unreachable() {
        let transport = MemoryTransport::new();
        let keypair = KeyPair::from_seed(&Seed::generate());
        assert!(matches!(
            transport.connect(&keypair.public_key()).await,
            Err(TransportError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_and_relisten() {
        let transport = MemoryTransport::new();
        let keypair = KeyPair::from_seed(&Seed::generate());
        let mut acceptor = transport.listen(&keypair).await.unwrap();
        assert!(matches!(
            transport.listen(&keypair).await,
            Err(TransportError::AddressInUse(_))
        ));

        assert!(transport.disconnect(&keypair.public_key()));
        assert!(!transport.is_listening(&keypair.public_key()));
        assert!(transport.connect(&keypair.public_key()).await.is_err());
        assert!(matches!(acceptor.accept().await, Err(TransportError::Closed)));

        assert!(transport.listen(&keypair).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_acceptor_frees_key() {
        let transport = MemoryTransport::new();
        let keypair = KeyPair::from_seed(&Seed::generate());
        drop(transport.listen(&keypair).await.unwrap());
        assert!(transport.connect(&keypair.public_key()).await.is_err());
        assert!(transport.listen(&keypair).await.is_ok());
    }
}
