//! Capability grants over the key tree and the escalation policy.
//!
//! A grant is issued once for a target path and never changes. What it
//! carries depends on its level:
//!
//! | level           | carries                                  | authorizes                    |
//! |-----------------|------------------------------------------|-------------------------------|
//! | `none`          | nothing                                  | nothing                       |
//! | `public-only`   | target public key, path                  | verify, exact path            |
//! | `category-read` | category public key, category, path      | derive-public, any server     |
//! | `category-sign` | category seed + public key, category, path | sign, exact path            |
//! | `full-control`  | master seed + public key                 | everything                    |
//!
//! A `category-sign` grant carries a secret that could derive every server
//! in its category, but the grant record only authorizes the path it was
//! issued for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::{DerivationError, KeyPair, PublicKey, Seed};
use crate::keyring::MasterKey;
use crate::path::DerivationPath;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("invalid access level: {0}")]
    InvalidAccessLevel(u8),
    #[error("unknown access level {0:?}")]
    UnknownAccessLevel(String),
    #[error("{held} grant cannot authorize {requested} on {path}")]
    EscalationDenied {
        held: AccessLevel,
        requested: AccessLevel,
        path: DerivationPath,
    },
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Ordered capability tier attached to a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum AccessLevel {
    None = 0,
    PublicOnly = 1,
    CategoryRead = 2,
    CategorySign = 3,
    FullControl = 4,
}

impl TryFrom<u8> for AccessLevel {
    type Error = AccessError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AccessLevel::None),
            1 => Ok(AccessLevel::PublicOnly),
            2 => Ok(AccessLevel::CategoryRead),
            3 => Ok(AccessLevel::CategorySign),
            4 => Ok(AccessLevel::FullControl),
            other => Err(AccessError::InvalidAccessLevel(other)),
        }
    }
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::PublicOnly => "public-only",
            AccessLevel::CategoryRead => "category-read",
            AccessLevel::CategorySign => "category-sign",
            AccessLevel::FullControl => "full-control",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AccessError;

    /// Accepts the kebab-case name or the numeric tier
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return AccessLevel::try_from(n);
        }
        match s {
            "none" => Ok(AccessLevel::None),
            "public-only" => Ok(AccessLevel::PublicOnly),
            "category-read" => Ok(AccessLevel::CategoryRead),
            "category-sign" => Ok(AccessLevel::CategorySign),
            "full-control" => Ok(AccessLevel::FullControl),
            other => Err(AccessError::UnknownAccessLevel(other.to_string())),
        }
    }
}

/// Something the holder of an allowed grant may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Verify,
    DerivePublic,
    Derive,
    Sign,
    Grant,
}

const PUBLIC_ONLY_CAPS: &[Capability] = &[Capability::Verify];
const CATEGORY_READ_CAPS: &[Capability] = &[Capability::DerivePublic, Capability::Verify];
const CATEGORY_SIGN_CAPS: &[Capability] = &[Capability::Sign, Capability::Verify];
const FULL_CONTROL_CAPS: &[Capability] = &[
    Capability::Derive,
    Capability::Sign,
    Capability::Verify,
    Capability::Grant,
];

/// Why an access check was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialReason {
    NoAccess,
    PathMismatch,
    CategoryMismatch,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenialReason::NoAccess => "No access granted",
            DenialReason::PathMismatch => "Path mismatch",
            DenialReason::CategoryMismatch => "Category mismatch",
        })
    }
}

/// Outcome of checking a grant against a requested path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed(&'static [Capability]),
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            AccessDecision::Allowed(caps) => caps,
            AccessDecision::Denied(_) => &[],
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            AccessDecision::Allowed(_) => None,
            AccessDecision::Denied(reason) => Some(*reason),
        }
    }
}

/// A request to mint a new grant, checked against an existing grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub level: AccessLevel,
    pub path: DerivationPath,
}

impl GrantRequest {
    pub fn new(level: AccessLevel, path: DerivationPath) -> Self {
        Self { level, path }
    }
}

/// A path-scoped capability record.
///
/// Serialized as `{"level": "...", "grant": {...}}` with hex-encoded keys
/// and seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "level",
    content = "grant",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum AccessGrant {
    None,
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
    FullControl {
        master_seed: Seed,
        public_key: PublicKey,
    },
}

impl AccessGrant {
    /// Issue a grant for `target` at `level` from the master key
    pub fn issue(
        master: &MasterKey,
        target: &DerivationPath,
        level: AccessLevel,
    ) -> Result<Self, AccessError> {
        let category = target.category_name();
        let grant = match level {
            AccessLevel::None => AccessGrant::None,
            AccessLevel::PublicOnly => AccessGrant::PublicOnly {
                public_key: master.public_key_for(target)?,
                path: target.clone(),
            },
            AccessLevel::CategoryRead => AccessGrant::CategoryRead {
                public_key: master.category_keypair(category).public_key(),
                category: category.to_string(),
                path: target.clone(),
            },
            AccessLevel::CategorySign => {
                let category_seed = master.category_seed(category);
                let public_key = KeyPair::from_seed(&category_seed).public_key();
                AccessGrant::CategorySign {
                    category_seed,
                    public_key,
                    category: category.to_string(),
                    path: target.clone(),
                }
            }
            AccessLevel::FullControl => AccessGrant::FullControl {
                master_seed: master.seed().clone(),
                public_key: master.public_key(),
            },
        };
        tracing::debug!("issued {} grant for {}", level, target);
        Ok(grant)
    }

    pub fn level(&self) -> AccessLevel {
        match self {
            AccessGrant::None => AccessLevel::None,
            AccessGrant::PublicOnly { .. } => AccessLevel::PublicOnly,
            AccessGrant::CategoryRead { .. } => AccessLevel::CategoryRead,
            AccessGrant::CategorySign { .. } => AccessLevel::CategorySign,
            AccessGrant::FullControl { .. } => AccessLevel::FullControl,
        }
    }

    /// The path the grant was issued for; `None` for unscoped grants
    pub fn path(&self) -> Option<&DerivationPath> {
        match self {
            AccessGrant::PublicOnly { path, .. }
            | AccessGrant::CategoryRead { path, .. }
            | AccessGrant::CategorySign { path, .. } => Some(path),
            AccessGrant::None | AccessGrant::FullControl { .. } => None,
        }
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            AccessGrant::None => None,
            AccessGrant::PublicOnly { public_key, .. }
            | AccessGrant::CategoryRead { public_key, .. }
            | AccessGrant::CategorySign { public_key, .. }
            | AccessGrant::FullControl { public_key, .. } => Some(*public_key),
        }
    }

    /// Check whether this grant authorizes `requested`
    pub fn verify_access(&self, requested: &DerivationPath) -> AccessDecision {
        match self {
            AccessGrant::None => AccessDecision::Denied(DenialReason::NoAccess),
            AccessGrant::PublicOnly { path, .. } => {
                if path != requested {
                    return AccessDecision::Denied(DenialReason::PathMismatch);
                }
                AccessDecision::Allowed(PUBLIC_ONLY_CAPS)
            }
            AccessGrant::CategoryRead { category, .. } => {
                if requested.category_name() != category {
                    return AccessDecision::Denied(DenialReason::CategoryMismatch);
                }
                AccessDecision::Allowed(CATEGORY_READ_CAPS)
            }
            // path-exact even though the seed spans the category
            AccessGrant::CategorySign { path, .. } => {
                if path != requested {
                    return AccessDecision::Denied(DenialReason::PathMismatch);
                }
                AccessDecision::Allowed(CATEGORY_SIGN_CAPS)
            }
            AccessGrant::FullControl { .. } => AccessDecision::Allowed(FULL_CONTROL_CAPS),
        }
    }

    /// Whether the holder of this grant may authorize `request`.
    ///
    /// Only `full-control` (anything) and `category-sign` (`category-read`
    /// or below, same category) can authorize new grants.
    pub fn can_escalate(&self, request: &GrantRequest) -> bool {
        if self.level() < request.level {
            return false;
        }
        match self {
            AccessGrant::FullControl { .. } => true,
            AccessGrant::CategorySign { category, .. } => {
                request.path.category_name() == category
                    && request.level <= AccessLevel::CategoryRead
            }
            _ => false,
        }
    }

    /// Mint a new grant from the material this grant carries.
    pub fn delegate(&self, request: &GrantRequest) -> Result<AccessGrant, AccessError> {
        if !self.can_escalate(request) {
            tracing::warn!(
                "refusing to delegate {} on {} from a {} grant",
                request.level,
                request.path,
                self.level()
            );
            return Err(AccessError::EscalationDenied {
                held: self.level(),
                requested: request.level,
                path: request.path.clone(),
            });
        }
        match self {
            AccessGrant::FullControl { master_seed, .. } => {
                let master = MasterKey::from_seed(master_seed.clone());
                AccessGrant::issue(&master, &request.path, request.level)
            }
            AccessGrant::CategorySign {
                category_seed,
                category,
                ..
            } => {
                let category_key = KeyPair::from_seed(category_seed).public_key();
                let grant = match request.level {
                    AccessLevel::None => AccessGrant::None,
                    AccessLevel::PublicOnly => AccessGrant::PublicOnly {
                        public_key: match request.path.server_name() {
                            Some(server) => category_key.sub_key(server)?,
                            None => category_key,
                        },
                        path: request.path.clone(),
                    },
                    _ => AccessGrant::CategoryRead {
                        public_key: category_key,
                        category: category.clone(),
                        path: request.path.clone(),
                    },
                };
                Ok(grant)
            }
            _ => Err(AccessError::EscalationDenied {
                held: self.level(),
                requested: request.level,
                path: request.path.clone(),
            }),
        }
    }
}
