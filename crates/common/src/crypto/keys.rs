use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use ed25519_dalek::hazmat::{raw_sign, ExpandedSecretKey};
use ed25519_dalek::{Signature, VerifyingKey};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::{Digest, Sha512};

/// Size of a seed in bytes
pub const SEED_SIZE: usize = 32;
/// Size of an Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Errors that can occur while parsing or converting key material
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Errors that can occur while deriving or using a keypair
#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("key cannot sign: no secret scalar held")]
    CannotSign,
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Fill a buffer from the operating system's CSPRNG
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
    bytes
}

/// A 32-byte root secret from which a keypair is deterministically derived.
///
/// Seeds exist at two stored scopes: the master seed, and per-category
/// seeds computed with [`super::derive_category_seed`]. Server keys are
/// never stored as seeds; they are derived on demand from a category keypair.
///
/// `Debug` is redacted. `Display` is the hex encoding used on the wire and
/// in persisted grants, so treat any formatted seed as secret.
#[derive(Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Seed([u8; SEED_SIZE]);

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Seed {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; SEED_SIZE]> for Seed {
    fn from(bytes: [u8; SEED_SIZE]) -> Self {
        Seed(bytes)
    }
}

impl Seed {
    /// Generate a new random seed using a cryptographically secure RNG
    pub fn generate() -> Self {
        Seed(random_bytes())
    }

    /// Parse a seed from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SEED_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| anyhow::anyhow!("seed hex decode error"))?;
        Ok(Seed(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> &[u8; SEED_SIZE] {
        &self.0
    }
}

/// Public half of a derived Ed25519 keypair.
///
/// Peers are addressed by their public key on the transport, and every
/// public key in the fleet can be re-derived from its category public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct PublicKey(VerifyingKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        Self::from_bytes(&buff)
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        let key = VerifyingKey::from_bytes(bytes)
            .map_err(|_| anyhow::anyhow!("public key is not a valid edwards point"))?;
        Ok(PublicKey(key))
    }

    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        Self::from_bytes(&buff)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    pub(crate) fn to_edwards(self) -> Result<EdwardsPoint, KeyError> {
        let point = CompressedEdwardsY::from_slice(&self.to_bytes())
            .map_err(|_| anyhow::anyhow!("public key invalid edwards point"))?
            .decompress()
            .ok_or_else(|| anyhow::anyhow!("public key failed to decompress edwards point"))?;
        Ok(point)
    }

    pub(crate) fn from_edwards(point: &EdwardsPoint) -> Result<Self, KeyError> {
        Self::from_bytes(&point.compress().to_bytes())
    }
}

/// Secret half of a keypair: the signing scalar plus the nonce prefix.
///
/// The scalar is not clamped once a key has been tweaked, so it is held
/// directly rather than as an Ed25519 seed.
#[derive(Clone)]
pub(crate) struct SecretScalar {
    pub(crate) scalar: Scalar,
    pub(crate) prefix: [u8; 32],
}

impl SecretScalar {
    fn from_seed(seed: &Seed) -> Self {
        let digest = Sha512::digest(seed.bytes());
        let mut lower = [0u8; 32];
        let mut prefix = [0u8; 32];
        lower.copy_from_slice(&digest[..32]);
        prefix.copy_from_slice(&digest[32..]);
        SecretScalar {
            scalar: Scalar::from_bytes_mod_order(clamp_integer(lower)),
            prefix,
        }
    }

    fn expanded(&self) -> ExpandedSecretKey {
        ExpandedSecretKey {
            scalar: self.scalar,
            hash_prefix: self.prefix,
        }
    }
}

/// A public key and, optionally, the secret scalar behind it.
///
/// A public-only keypair can verify signatures and derive further public
/// sub-keys, but cannot sign or derive secret sub-keys.
#[derive(Clone)]
pub struct KeyPair {
    pub(crate) public: PublicKey,
    pub(crate) secret: Option<SecretScalar>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &self.secret.as_ref().map(|_| ".."))
            .finish()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
            && match (&self.secret, &other.secret) {
                (Some(a), Some(b)) => a.scalar == b.scalar && a.prefix == b.prefix,
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for KeyPair {}

impl From<PublicKey> for KeyPair {
    fn from(public: PublicKey) -> Self {
        KeyPair::public_only(public)
    }
}

impl KeyPair {
    /// Deterministically derive a full keypair from a seed.
    ///
    /// Uses standard Ed25519 key expansion, so the public key matches
    /// the one any Ed25519 implementation derives from the same seed.
    pub fn from_seed(seed: &Seed) -> Self {
        let secret = SecretScalar::from_seed(seed);
        let point = EdwardsPoint::mul_base(&secret.scalar);
        let public = PublicKey::from_edwards(&point)
            .expect("scalar multiple of the basepoint is a valid public key");
        KeyPair {
            public,
            secret: Some(secret),
        }
    }

    pub fn public_only(public: PublicKey) -> Self {
        KeyPair {
            public,
            secret: None,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn can_sign(&self) -> bool {
        self.secret.is_some()
    }

    /// Drop the secret scalar, keeping only the verification capability
    pub fn to_public(&self) -> KeyPair {
        KeyPair::public_only(self.public)
    }

    /// Sign a message, failing with [`DerivationError::CannotSign`] for
    /// public-only keypairs.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, DerivationError> {
        let secret = self.secret.as_ref().ok_or(DerivationError::CannotSign)?;
        Ok(raw_sign::<Sha512>(
            &secret.expanded(),
            msg,
            self.public.verifying_key(),
        ))
    }

    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), ed25519_dalek::SignatureError> {
        self.public.verify(msg, signature)
    }
}

/// Hex (de)serialization for detached signatures.
pub mod signature_hex {
    use ed25519_dalek::Signature;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::SIGNATURE_SIZE;

    pub fn serialize<S>(signature: &Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(signature.to_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let hex = String::deserialize(deserializer)?;
        let mut buff = [0u8; SIGNATURE_SIZE];
        hex::decode_to_slice(hex.strip_prefix("0x").unwrap_or(&hex), &mut buff)
            .map_err(|e| D::Error::custom(format!("signature hex decode error: {}", e)))?;
        Ok(Signature::from_bytes(&buff))
    }
}
