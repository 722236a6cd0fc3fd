/**
 * Access grants over the key tree.
 *  - Ordered access levels and per-level grant payloads
 *  - Path checks and the escalation policy
 */
pub mod access;
/**
 * Proof of key possession: single-use
 *  challenges and signed bearer tokens.
 */
pub mod auth;
/**
 * Cryptographic types and operations.
 *  - Seeds, public keys and keypairs
 *  - One-way hierarchical derivation
 */
pub mod crypto;
/**
 * Master key custody; the root every
 *  category and server key is derived from.
 */
pub mod keyring;
/**
 * Ping / challenge / status protocol between
 *  peers, plus bulk checks and monitoring.
 */
pub mod liveness;
/**
 * `category/server` addressing.
 */
pub mod path;
/**
 * Grant-scoped recovery shares and the
 *  store peers redeem them from.
 */
pub mod recovery;
/**
 * In-process fleets for integration tests.
 */
pub mod testkit;
/**
 * Peer transport abstraction with in-memory
 *  and TCP implementations.
 */
pub mod transport;
/**
 * Fleet topology and key listings.
 */
pub mod tree;

pub mod prelude {
    pub use crate::access::{AccessDecision, AccessGrant, AccessLevel, Capability, GrantRequest};
    pub use crate::auth::{ChallengeAuthenticator, Token};
    pub use crate::crypto::{KeyPair, PublicKey, Seed};
    pub use crate::keyring::MasterKey;
    pub use crate::liveness::{LivenessServer, ProbeKind, ProbeOptions, Prober, ServerIdentity};
    pub use crate::path::DerivationPath;
    pub use crate::recovery::{RecoveryShare, RecoveryStore};
    pub use crate::transport::{MemoryTransport, PeerTransport, TcpTransport};
    pub use crate::tree::Topology;
}
