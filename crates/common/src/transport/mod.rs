//! Peer transport abstraction.
//!
//! Peers are addressed by public key. The liveness protocol only needs an
//! ordered, reliable byte stream per connection; how a public key is turned
//! into a route is up to the implementation.

mod memory;
mod tcp;

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::crypto::{KeyPair, PublicKey};

pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

/// A bidirectional byte stream to a peer
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn PeerStream>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(PublicKey),
    #[error("no address known for peer {0}")]
    UnknownPeer(PublicKey),
    #[error("already listening as {0}")]
    AddressInUse(PublicKey),
    #[error("listener closed")]
    Closed,
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Yields inbound connections for one listening identity
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next inbound connection
    async fn accept(&mut self) -> Result<BoxedStream, TransportError>;
}

/// Connect to and listen as peers identified by public key
#[async_trait]
pub trait PeerTransport: Send + Sync + Debug {
    /// Start accepting connections addressed to `keypair`'s public key
    async fn listen(&self, keypair: &KeyPair) -> Result<Box<dyn Acceptor>, TransportError>;

    /// Open a stream to the peer holding `public_key`
    async fn connect(&self, public_key: &PublicKey) -> Result<BoxedStream, TransportError>;
}
