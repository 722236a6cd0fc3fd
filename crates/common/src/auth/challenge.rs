use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::crypto::{random_bytes, DerivationError, KeyPair, PublicKey, Signature};

/// How long an unredeemed challenge stays valid
pub const CHALLENGE_TTL: Duration = Duration::from_secs(60);
pub const NONCE_SIZE: usize = 32;
const CHALLENGE_ID_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("challenge not found")]
    NotFound,
    #[error("challenge expired")]
    Expired,
    #[error("challenge was bound to a different public key")]
    PublicKeyMismatch,
    #[error("invalid challenge signature")]
    InvalidSignature,
}

/// Random bytes a peer signs to prove key possession
#[derive(Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn generate() -> Self {
        Nonce(random_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl From<[u8; NONCE_SIZE]> for Nonce {
    fn from(bytes: [u8; NONCE_SIZE]) -> Self {
        Nonce(bytes)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Nonce {
    type Err = hex::FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buff = [0u8; NONCE_SIZE];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut buff)?;
        Ok(Nonce(buff))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(String);

impl ChallengeId {
    fn generate() -> Self {
        ChallengeId(hex::encode(random_bytes::<CHALLENGE_ID_SIZE>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChallengeId {
    fn from(id: String) -> Self {
        ChallengeId(id)
    }
}

/// An outstanding challenge
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: ChallengeId,
    pub nonce: Nonce,
    /// When set, only a signature under this key redeems the challenge
    pub public_key: Option<PublicKey>,
    pub expires: Instant,
}

impl Challenge {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

/// Issues and redeems single-use challenges.
///
/// Cloning shares the pending table. Expired entries are evicted whenever a
/// new challenge is created, on lookup, and by
/// [`ChallengeAuthenticator::sweep_expired`].
#[derive(Debug, Clone)]
pub struct ChallengeAuthenticator {
    pending: Arc<Mutex<HashMap<ChallengeId, Challenge>>>,
    ttl: Duration,
}

impl Default for ChallengeAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeAuthenticator {
    pub fn new() -> Self {
        Self::with_ttl(CHALLENGE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a challenge, optionally bound to the key expected to sign it
    pub fn create_challenge(&self, public_key: Option<PublicKey>) -> Challenge {
        let now = Instant::now();
        let challenge = Challenge {
            id: ChallengeId::generate(),
            nonce: Nonce::generate(),
            public_key,
            expires: now + self.ttl,
        };
        let mut pending = self.pending.lock();
        // evict anything already expired so unredeemed entries cannot pile up
        pending.retain(|_, existing| !existing.is_expired(now));
        pending.insert(challenge.id.clone(), challenge.clone());
        drop(pending);
        tracing::debug!("created challenge {}", challenge.id);
        challenge
    }

    pub fn sign_challenge(keypair: &KeyPair, nonce: &Nonce) -> Result<Signature, DerivationError> {
        keypair.sign(nonce.as_bytes())
    }

    /// Redeem a challenge.
    ///
    /// The entry is removed before anything is checked, so a second call
    /// with the same id always fails with [`ChallengeError::NotFound`].
    pub fn verify_challenge(
        &self,
        id: &ChallengeId,
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<(), ChallengeError> {
        let challenge = self
            .pending
            .lock()
            .remove(id)
            .ok_or(ChallengeError::NotFound)?;

        if challenge.is_expired(Instant::now()) {
            tracing::debug!("challenge {} expired before redemption", id);
            return Err(ChallengeError::Expired);
        }
        if let Some(bound) = &challenge.public_key {
            if bound != public_key {
                tracing::warn!("challenge {} redeemed with unexpected key {}", id, public_key);
                return Err(ChallengeError::PublicKeyMismatch);
            }
        }
        public_key
            .verify(challenge.nonce.as_bytes(), signature)
            .map_err(|_| ChallengeError::InvalidSignature)
    }

    /// Forget a challenge without redeeming it
    pub fn discard(&self, id: &ChallengeId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, challenge| !challenge.is_expired(now));
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Sweep expired challenges on a fixed interval until shutdown
    pub fn spawn_sweeper(
        &self,
        every: Duration,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let authenticator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = authenticator.sweep_expired();
                        if removed > 0 {
                            tracing::debug!("swept {} expired challenges", removed);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("challenge sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
