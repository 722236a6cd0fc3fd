//! Recovery shares: grant-scoped key material that peers hold on behalf of
//! a server, so the server can get its keys back while the master is
//! offline.
//!
//! A share is cut for one recipient grant and carries exactly what that
//! grant's level entitles it to. Redemption re-checks the grant and picks
//! the share whose kind matches the grant level exactly; a higher share at
//! the same path is never handed out in its place.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::{AccessGrant, AccessLevel, DenialReason};
use crate::crypto::{DerivationError, KeyPair, PublicKey, Seed};
use crate::keyring::MasterKey;
use crate::path::DerivationPath;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Recovery denied: {0}")]
    RecoveryDenied(DenialReason),
    #[error("Access denied: {0}")]
    AccessDenied(DenialReason),
    #[error("No recovery shares available for {0}")]
    NoSharesAtPath(DerivationPath),
    #[error("No {kind} share available for {path}")]
    NoShareOfType {
        kind: ShareKind,
        path: DerivationPath,
    },
    #[error("{0} grants cannot be used for recovery")]
    InvalidGrantLevel(AccessLevel),
    #[error("{path} is outside the scope of this {kind} share")]
    OutOfScope {
        kind: ShareKind,
        path: DerivationPath,
    },
    #[error("{0} shares carry no signing material")]
    CannotSign(ShareKind),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Share kinds, named after the grant level they serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShareKind {
    PublicOnly,
    CategoryRead,
    CategorySign,
}

impl ShareKind {
    /// The share kind a grant at `level` redeems, if any
    pub fn for_level(level: AccessLevel) -> Option<Self> {
        match level {
            AccessLevel::PublicOnly => Some(ShareKind::PublicOnly),
            AccessLevel::CategoryRead => Some(ShareKind::CategoryRead),
            AccessLevel::CategorySign => Some(ShareKind::CategorySign),
            AccessLevel::None | AccessLevel::FullControl => None,
        }
    }

    pub fn level(&self) -> AccessLevel {
        match self {
            ShareKind::PublicOnly => AccessLevel::PublicOnly,
            ShareKind::CategoryRead => AccessLevel::CategoryRead,
            ShareKind::CategorySign => AccessLevel::CategorySign,
        }
    }
}

impl fmt::Display for ShareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.level(), f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RecoveryShare {
    PublicOnly {
        public_key: PublicKey,
        path: DerivationPath,
    },
    CategoryRead {
        public_key: PublicKey,
        category: String,
        path: DerivationPath,
    },
    CategorySign {
        category_seed: Seed,
        public_key: PublicKey,
        category: String,
        path: DerivationPath,
    },
}

impl RecoveryShare {
    /// Cut a share at `path` for the holder of `recipient_grant`.
    ///
    /// The grant must pass an access check for `path`; the share's kind is
    /// the grant's level.
    pub fn create(
        master: &MasterKey,
        path: &DerivationPath,
        recipient_grant: &AccessGrant,
    ) -> Result<Self, RecoveryError> {
        let decision = recipient_grant.verify_access(path);
        if let Some(reason) = decision.reason() {
            tracing::warn!("refusing recovery share for {}: {}", path, reason);
            return Err(RecoveryError::RecoveryDenied(reason));
        }

        let level = recipient_grant.level();
        let kind = ShareKind::for_level(level).ok_or(RecoveryError::InvalidGrantLevel(level))?;
        let category = path.category_name();
        let share = match kind {
            ShareKind::PublicOnly => RecoveryShare::PublicOnly {
                public_key: master.public_key_for(path)?,
                path: path.clone(),
            },
            ShareKind::CategoryRead => RecoveryShare::CategoryRead {
                public_key: master.category_keypair(category).public_key(),
                category: category.to_string(),
                path: path.clone(),
            },
            ShareKind::CategorySign => {
                let category_seed = master.category_seed(category);
                RecoveryShare::CategorySign {
                    public_key: KeyPair::from_seed(&category_seed).public_key(),
                    category_seed,
                    category: category.to_string(),
                    path: path.clone(),
                }
            }
        };
        tracing::debug!("created {} recovery share for {}", kind, path);
        Ok(share)
    }

    pub fn kind(&self) -> ShareKind {
        match self {
            RecoveryShare::PublicOnly { .. } => ShareKind::PublicOnly,
            RecoveryShare::CategoryRead { .. } => ShareKind::CategoryRead,
            RecoveryShare::CategorySign { .. } => ShareKind::CategorySign,
        }
    }

    pub fn path(&self) -> &DerivationPath {
        match self {
            RecoveryShare::PublicOnly { path, .. }
            | RecoveryShare::CategoryRead { path, .. }
            | RecoveryShare::CategorySign { path, .. } => path,
        }
    }

    fn category(&self) -> &str {
        match self {
            RecoveryShare::PublicOnly { path, .. } => path.category_name(),
            RecoveryShare::CategoryRead { category, .. }
            | RecoveryShare::CategorySign { category, .. } => category,
        }
    }

    fn in_scope(&self, target: &DerivationPath) -> bool {
        match self {
            RecoveryShare::PublicOnly { path, .. } => path == target,
            _ => target.category_name() == self.category(),
        }
    }

    /// Public key at `target` recovered from this share.
    ///
    /// Category shares resolve any path in their category; a public-only
    /// share resolves only its own path.
    pub fn public_key_for(&self, target: &DerivationPath) -> Result<PublicKey, RecoveryError> {
        if !self.in_scope(target) {
            return Err(RecoveryError::OutOfScope {
                kind: self.kind(),
                path: target.clone(),
            });
        }
        match self {
            RecoveryShare::PublicOnly { public_key, .. } => Ok(*public_key),
            RecoveryShare::CategoryRead { public_key, .. }
            | RecoveryShare::CategorySign { public_key, .. } => match target.server_name() {
                Some(server) => Ok(public_key.sub_key(server)?),
                None => Ok(*public_key),
            },
        }
    }

    /// Signing keypair at `target`; only `category-sign` shares have one
    pub fn keypair_for(&self, target: &DerivationPath) -> Result<KeyPair, RecoveryError> {
        let RecoveryShare::CategorySign { category_seed, .. } = self else {
            return Err(RecoveryError::CannotSign(self.kind()));
        };
        if !self.in_scope(target) {
            return Err(RecoveryError::OutOfScope {
                kind: self.kind(),
                path: target.clone(),
            });
        }
        let category = KeyPair::from_seed(category_seed);
        match target.server_name() {
            Some(server) => Ok(category.sub_key(server)?),
            None => Ok(category),
        }
    }
}

/// Shares grouped by the path they were cut for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryStore {
    shares: BTreeMap<DerivationPath, Vec<RecoveryShare>>,
}

impl RecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shares(shares: impl IntoIterator<Item = RecoveryShare>) -> Self {
        let mut store = Self::new();
        for share in shares {
            store.insert(share);
        }
        store
    }

    pub fn insert(&mut self, share: RecoveryShare) {
        self.shares
            .entry(share.path().clone())
            .or_default()
            .push(share);
    }

    pub fn shares_at(&self, path: &DerivationPath) -> &[RecoveryShare] {
        self.shares.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn paths(&self) -> impl Iterator<Item = &DerivationPath> {
        self.shares.keys()
    }

    pub fn len(&self) -> usize {
        self.shares.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Redeem a share at `path` with `grant`.
    ///
    /// The grant is checked again here, then the first share whose kind
    /// equals the grant level is returned.
    pub fn request(
        &self,
        path: &DerivationPath,
        grant: &AccessGrant,
    ) -> Result<&RecoveryShare, RecoveryError> {
        if let Some(reason) = grant.verify_access(path).reason() {
            tracing::warn!("recovery request for {} denied: {}", path, reason);
            return Err(RecoveryError::AccessDenied(reason));
        }
        let level = grant.level();
        let kind = ShareKind::for_level(level).ok_or(RecoveryError::InvalidGrantLevel(level))?;

        let shares = self.shares_at(path);
        if shares.is_empty() {
            return Err(RecoveryError::NoSharesAtPath(path.clone()));
        }
        shares
            .iter()
            .find(|share| share.kind() == kind)
            .ok_or_else(|| RecoveryError::NoShareOfType {
                kind,
                path: path.clone(),
            })
    }
}

/// Whether `grant` would pass the access check for recovering `path`
pub fn can_recover(grant: &AccessGrant, path: &DerivationPath) -> bool {
    grant.verify_access(path).is_allowed()
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(s: &str) -> DerivationPath {
        s.parse().unwrap()
    }

    fn grant(master: &MasterKey, p: &str, level: AccessLevel) -> AccessGrant {
        AccessGrant::issue(master, &path(p), level).unwrap()
    }

    #[test]
    fn test_share_kind_follows_grant_level() {
        let master = MasterKey::generate();
        for (level, kind) in [
            (AccessLevel::PublicOnly, ShareKind::PublicOnly),
            (AccessLevel::CategoryRead, ShareKind::CategoryRead),
            (AccessLevel::CategorySign, ShareKind::CategorySign),
        ] {
            let g = grant(&master, "api/server1", level);
            let share = RecoveryShare::create(&master, &path("api/server1"), &g).unwrap();
            assert_eq!(share.kind(), kind);
        }
    }

    #[test]
    fn test_create_denied_without_access() {
        let master = MasterKey::generate();
        let g = grant(&master, "cache/redis1", AccessLevel::PublicOnly);
        assert!(matches!(
            RecoveryShare::create(&master, &path("cache/redis2"), &g),
            Err(RecoveryError::RecoveryDenied(DenialReason::PathMismatch))
        ));
        let none = grant(&master, "cache/redis1", AccessLevel::None);
        assert!(matches!(
            RecoveryShare::create(&master, &path("cache/redis1"), &none),
            Err(RecoveryError::RecoveryDenied(DenialReason::NoAccess))
        ));
    }

    #[test]
    fn test_full_control_is_not_a_share() {
        let master = MasterKey::generate();
        let g = grant(&master, "api/server1", AccessLevel::FullControl);
        assert!(matches!(
            RecoveryShare::create(&master, &path("api/server1"), &g),
            Err(RecoveryError::InvalidGrantLevel(AccessLevel::FullControl))
        ));
    }

    #[test]
    fn test_public_only_share_has_no_secret() {
        let master = MasterKey::generate();
        let g = grant(&master, "api/server1", AccessLevel::PublicOnly);
        let share = RecoveryShare::create(&master, &path("api/server1"), &g).unwrap();
        let json = serde_json::to_value(&share).unwrap();
        assert_eq!(json["type"], "public-only");
        assert!(json.get("categorySeed").is_none());
        assert!(matches!(
            share.keypair_for(&path("api/server1")),
            Err(RecoveryError::CannotSign(ShareKind::PublicOnly))
        ));
        assert!(matches!(
            share.public_key_for(&path("api/server2")),
            Err(RecoveryError::OutOfScope { .. })
        ));
    }

    #[test]
    fn test_category_sign_share_recovers_siblings() {
        let master = MasterKey::generate();
        let g = grant(&master, "api/server1", AccessLevel::CategorySign);
        let share = RecoveryShare::create(&master, &path("api/server1"), &g).unwrap();

        let sibling = share.keypair_for(&path("api/server2")).unwrap();
        assert_eq!(sibling, master.keypair_for(&path("api/server2")).unwrap());
        assert!(matches!(
            share.keypair_for(&path("db/primary")),
            Err(RecoveryError::OutOfScope { .. })
        ));
    }

    #[test]
    fn test_category_read_share_derives_public_keys() {
        let master = MasterKey::generate();
        let g = grant(&master, "db/primary", AccessLevel::CategoryRead);
        let share = RecoveryShare::create(&master, &path("db/primary"), &g).unwrap();
        assert_eq!(
            share.public_key_for(&path("db/replica")).unwrap(),
            master.public_key_for(&path("db/replica")).unwrap()
        );
        assert!(matches!(
            share.keypair_for(&path("db/primary")),
            Err(RecoveryError::CannotSign(ShareKind::CategoryRead))
        ));
    }

    #[test]
    fn test_store_groups_by_path() {
        let master = MasterKey::generate();
        let p = path("api/server1");
        let shares = [AccessLevel::PublicOnly, AccessLevel::CategorySign, AccessLevel::PublicOnly]
            .into_iter()
            .map(|level| RecoveryShare::create(&master, &p, &grant(&master, "api/server1", level)).unwrap());
        let store = RecoveryStore::from_shares(shares);
        assert_eq!(store.shares_at(&p).len(), 3);
        assert_eq!(store.len(), 3);
        assert!(store.shares_at(&path("api/server2")).is_empty());
    }

    #[test]
    fn test_request_never_returns_higher_share() {
        let master = MasterKey::generate();
        let p = path("api/server1");
        let sign = grant(&master, "api/server1", AccessLevel::CategorySign);
        let store = RecoveryStore::from_shares([RecoveryShare::create(&master, &p, &sign).unwrap()]);

        let public = grant(&master, "api/server1", AccessLevel::PublicOnly);
        assert!(matches!(
            store.request(&p, &public),
            Err(RecoveryError::NoShareOfType {
                kind: ShareKind::PublicOnly,
                ..
            })
        ));
        assert_eq!(store.request(&p, &sign).unwrap().kind(), ShareKind::CategorySign);
    }

    #[test]
    fn test_request_checks_grant_first() {
        let master = MasterKey::generate();
        let store = RecoveryStore::new();
        let foreign = grant(&master, "db/primary", AccessLevel::CategorySign);
        assert!(matches!(
            store.request(&path("api/server1"), &foreign),
            Err(RecoveryError::AccessDenied(DenialReason::PathMismatch))
        ));
        let own = grant(&master, "api/server1", AccessLevel::CategorySign);
        assert!(matches!(
            store.request(&path("api/server1"), &own),
            Err(RecoveryError::NoSharesAtPath(_))
        ));
        assert!(!can_recover(&foreign, &path("api/server1")));
        assert!(can_recover(&own, &path("api/server1")));
    }

    #[test]
    fn test_store_serializes_as_path_map() {
        let master = MasterKey::generate();
        let p = path("cache/redis1");
        let g = grant(&master, "cache/redis1", AccessLevel::CategoryRead);
        let store = RecoveryStore::from_shares([RecoveryShare::create(&master, &p, &g).unwrap()]);
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["cache/redis1"][0]["type"], "category-read");
        assert_eq!(json["cache/redis1"][0]["category"], "cache");

        let back: RecoveryStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
