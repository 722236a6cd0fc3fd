use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::auth::{Token, TokenError};
use crate::crypto::{derive_category_seed, DerivationError, KeyError, KeyPair, PublicKey, Seed};
use crate::path::DerivationPath;

/// The root of a fleet's key tree.
///
/// Holds the master seed and the keypair derived from it. Every category
/// seed, and through it every server key, is computed on demand from here.
/// This is the only value able to issue grants at every level.
#[derive(Clone)]
pub struct MasterKey {
    seed: Seed,
    keypair: KeyPair,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("public_key", &self.keypair.public_key())
            .finish_non_exhaustive()
    }
}

impl MasterKey {
    pub fn generate() -> Self {
        Self::from_seed(Seed::generate())
    }

    pub fn from_seed(seed: Seed) -> Self {
        let keypair = KeyPair::from_seed(&seed);
        Self { seed, keypair }
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from_seed(Seed::from_hex(hex)?))
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn category_seed(&self, category: &str) -> Seed {
        derive_category_seed(&self.seed, category)
    }

    pub fn category_keypair(&self, category: &str) -> KeyPair {
        KeyPair::from_seed(&self.category_seed(category))
    }

    /// Full keypair for the node at `path`.
    ///
    /// A server key is the category keypair tweaked by the server name; a
    /// category-only path yields the category keypair itself.
    pub fn keypair_for(&self, path: &DerivationPath) -> Result<KeyPair, DerivationError> {
        let category = self.category_keypair(path.category_name());
        match path.server_name() {
            Some(server) => category.sub_key(server),
            None => Ok(category),
        }
    }

    pub fn public_key_for(&self, path: &DerivationPath) -> Result<PublicKey, DerivationError> {
        Ok(self.keypair_for(path)?.public_key())
    }

    /// Issue a bearer token signed by the key at `path`
    pub fn bearer_token<T: Serialize>(
        &self,
        path: &DerivationPath,
        data: &T,
        ttl: Duration,
    ) -> Result<Token, TokenError> {
        let keypair = self.keypair_for(path)?;
        Token::issue(&keypair, data, ttl)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(s: &str) -> DerivationPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_server_keys_are_deterministic() {
        let master = MasterKey::generate();
        let again = MasterKey::from_hex(&master.seed().to_hex()).unwrap();
        assert_eq!(
            master.keypair_for(&path("api/server1")).unwrap(),
            again.keypair_for(&path("api/server1")).unwrap()
        );
    }

    #[test]
    fn test_no_upward_derivation() {
        let master = MasterKey::generate();
        let api = master.category_keypair("api");
        let db = master.category_keypair("db");
        assert_ne!(api.public_key(), master.public_key());
        assert_ne!(api.public_key(), db.public_key());
        assert_ne!(
            master.keypair_for(&path("api/server1")).unwrap().public_key(),
            master.keypair_for(&path("db/server1")).unwrap().public_key()
        );
    }

    #[test]
    fn test_category_path_is_category_key() {
        let master = MasterKey::generate();
        assert_eq!(
            master.keypair_for(&path("cache")).unwrap(),
            master.category_keypair("cache")
        );
    }

    #[test]
    fn test_bearer_token_signed_by_server_key() {
        let master = MasterKey::generate();
        let token = master
            .bearer_token(&path("api/server1"), &"deploy", Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            token.public_key,
            master.public_key_for(&path("api/server1")).unwrap()
        );
        assert_eq!(token.verify().unwrap(), &serde_json::json!("deploy"));
    }
}
