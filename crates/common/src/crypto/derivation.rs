//! One-way hierarchical derivation over Ed25519 keys.
//!
//! A child key is the parent key tweaked by a scalar bound to the parent's
//! public key and the child's name:
//!
//! ```text
//! t        = H(domain || parent_public || name)   (reduced mod l)
//! child_A  = parent_A + t·B
//! child_a  = parent_a + t
//! ```
//!
//! Anyone holding only `parent_A` can compute `child_A`, while signing with
//! the child requires `parent_a`. Going upward (child → parent) or sideways
//! (sibling category → category) requires solving a discrete log.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};

use super::keys::{DerivationError, KeyPair, PublicKey, SecretScalar, Seed, SEED_SIZE};

const TWEAK_DOMAIN: &[u8] = b"keyring/v1/tweak";
const PREFIX_DOMAIN: &[u8] = b"keyring/v1/prefix";

/// Compute a category seed as `H(master_seed || category)`.
///
/// Deterministic: the same master seed and name always give the same seed.
pub fn derive_category_seed(master: &Seed, category: &str) -> Seed {
    let mut hasher = blake3::Hasher::new();
    hasher.update(master.bytes());
    hasher.update(category.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; SEED_SIZE];
    bytes.copy_from_slice(hash.as_bytes());
    Seed::from(bytes)
}

fn tweak(parent: &PublicKey, segment: &str) -> Scalar {
    let digest = Sha512::new()
        .chain_update(TWEAK_DOMAIN)
        .chain_update(parent.to_bytes())
        .chain_update(segment.as_bytes())
        .finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn child_prefix(parent_prefix: &[u8; 32], segment: &str) -> [u8; 32] {
    let digest = Sha512::new()
        .chain_update(PREFIX_DOMAIN)
        .chain_update(parent_prefix)
        .chain_update(segment.as_bytes())
        .finalize();
    let mut prefix = [0u8; 32];
    prefix.copy_from_slice(&digest[..32]);
    prefix
}

fn validate_segment(segment: &str) -> Result<(), DerivationError> {
    if segment.is_empty() {
        return Err(DerivationError::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains('/') {
        return Err(DerivationError::InvalidPath(format!(
            "segment {:?} contains a separator",
            segment
        )));
    }
    Ok(())
}

impl PublicKey {
    /// Derive the public sub-key for a single path segment
    pub fn sub_key(&self, segment: &str) -> Result<PublicKey, DerivationError> {
        validate_segment(segment)?;
        let t = tweak(self, segment);
        let point = self.to_edwards()? + EdwardsPoint::mul_base(&t);
        Ok(PublicKey::from_edwards(&point)?)
    }

    /// Derive along a `/`-separated path of segments
    pub fn derive(&self, path: &str) -> Result<PublicKey, DerivationError> {
        path.split('/')
            .try_fold(*self, |current, segment| current.sub_key(segment))
    }
}

impl KeyPair {
    /// Derive the sub-keypair for a single path segment.
    ///
    /// A full keypair yields a full sub-keypair capable of signing; a
    /// public-only keypair yields a public-only sub-keypair.
    pub fn sub_key(&self, segment: &str) -> Result<KeyPair, DerivationError> {
        validate_segment(segment)?;
        let t = tweak(&self.public, segment);
        let public = self.public.sub_key(segment)?;
        let secret = self.secret.as_ref().map(|secret| SecretScalar {
            scalar: secret.scalar + t,
            prefix: child_prefix(&secret.prefix, segment),
        });
        Ok(KeyPair { public, secret })
    }

    /// Derive along a `/`-separated path of segments.
    ///
    /// `derive("a/b/c")` equals `sub_key("a")?.sub_key("b")?.sub_key("c")`.
    pub fn derive(&self, path: &str) -> Result<KeyPair, DerivationError> {
        path.split('/')
            .try_fold(self.clone(), |current, segment| current.sub_key(segment))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_category_seed_is_deterministic() {
        let master = Seed::generate();
        assert_eq!(
            derive_category_seed(&master, "api"),
            derive_category_seed(&master, "api")
        );
        assert_ne!(
            derive_category_seed(&master, "api"),
            derive_category_seed(&master, "db")
        );
        assert_ne!(
            derive_category_seed(&master, "api"),
            derive_category_seed(&Seed::generate(), "api")
        );
    }

    #[test]
    fn test_chained_equals_multi_segment() {
        let root = KeyPair::from_seed(&Seed::generate());
        let chained = root
            .sub_key("a")
            .unwrap()
            .sub_key("b")
            .unwrap()
            .sub_key("c")
            .unwrap();
        assert_eq!(chained, root.derive("a/b/c").unwrap());
    }

    #[test]
    fn test_public_derivation_matches_secret_derivation() {
        let root = KeyPair::from_seed(&Seed::generate());
        let full = root.derive("api/server1").unwrap();
        let public = root.public_key().derive("api/server1").unwrap();
        assert_eq!(full.public_key(), public);

        let from_public_pair = root.to_public().derive("api/server1").unwrap();
        assert!(!from_public_pair.can_sign());
        assert_eq!(from_public_pair.public_key(), public);
    }

    #[test]
    fn test_derived_keys_sign_and_verify() {
        let root = KeyPair::from_seed(&Seed::generate());
        let child = root.derive("db/primary").unwrap();
        let signature = child.sign(b"nonce").unwrap();

        let public = root.public_key().derive("db/primary").unwrap();
        assert!(public.verify(b"nonce", &signature).is_ok());
        assert!(root.public_key().verify(b"nonce", &signature).is_err());
    }

    #[test]
    fn test_siblings_differ() {
        let root = KeyPair::from_seed(&Seed::generate());
        assert_ne!(
            root.sub_key("server1").unwrap().public_key(),
            root.sub_key("server2").unwrap().public_key()
        );
    }

    #[test]
    fn test_empty_segments_rejected() {
        let root = KeyPair::from_seed(&Seed::generate());
        assert!(matches!(
            root.sub_key(""),
            Err(DerivationError::InvalidPath(_))
        ));
        assert!(matches!(
            root.derive("a//b"),
            Err(DerivationError::InvalidPath(_))
        ));
        assert!(matches!(
            root.public_key().derive(""),
            Err(DerivationError::InvalidPath(_))
        ));
    }
}
