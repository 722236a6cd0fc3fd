use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use super::{Acceptor, BoxedStream, PeerTransport, TransportError};
use crate::crypto::{KeyPair, PublicKey};

/// TCP transport with a fixed public key to socket address book.
///
/// Identity is not checked at the transport layer; a challenge probe is
/// what proves the peer holds the key it was addressed by.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    book: Arc<HashMap<PublicKey, SocketAddr>>,
}

impl TcpTransport {
    pub fn new(book: HashMap<PublicKey, SocketAddr>) -> Self {
        Self {
            book: Arc::new(book),
        }
    }

    pub fn address_of(&self, public_key: &PublicKey) -> Result<SocketAddr, TransportError> {
        self.book
            .get(public_key)
            .copied()
            .ok_or(TransportError::UnknownPeer(*public_key))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<BoxedStream, TransportError> {
        let (stream, remote) = self.listener.accept().await?;
        tracing::debug!("accepted tcp connection from {}", remote);
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn listen(&self, keypair: &KeyPair) -> Result<Box<dyn Acceptor>, TransportError> {
        let addr = self.address_of(&keypair.public_key())?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("listening for {} on {}", keypair.public_key(), listener.local_addr()?);
        Ok(Box::new(TcpAcceptor { listener }))
    }

    async fn connect(&self, public_key: &PublicKey) -> Result<BoxedStream, TransportError> {
        let addr = self.address_of(public_key)?;
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            tracing::debug!("tcp connect to {} ({}) failed: {}", public_key, addr, e);
            TransportError::Unreachable(*public_key)
        })?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
