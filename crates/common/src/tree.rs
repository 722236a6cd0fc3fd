//! Fleet topology and key listings derived from it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{DerivationError, PublicKey};
use crate::keyring::MasterKey;
use crate::path::{DerivationPath, PathError};

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Which servers exist in which categories.
///
/// Serialized as a plain map of category to server names, which is also
/// the `[categories]` table in the CLI config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    categories: BTreeMap<String, BTreeSet<String>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the server was already present
    pub fn add_server(&mut self, category: &str, server: &str) -> Result<bool, PathError> {
        DerivationPath::server(category, server)?;
        Ok(self
            .categories
            .entry(category.to_string())
            .or_default()
            .insert(server.to_string()))
    }

    /// Remove a server, dropping its category once empty
    pub fn remove_server(&mut self, category: &str, server: &str) -> bool {
        let Some(servers) = self.categories.get_mut(category) else {
            return false;
        };
        let removed = servers.remove(server);
        if servers.is_empty() {
            self.categories.remove(category);
        }
        removed
    }

    /// Move every server under `from` to `to`.
    ///
    /// Keys for the moved servers change, since they are derived from the
    /// category name.
    pub fn rename_category(&mut self, from: &str, to: &str) -> Result<bool, PathError> {
        DerivationPath::category(to)?;
        let Some(servers) = self.categories.remove(from) else {
            return Ok(false);
        };
        self.categories
            .entry(to.to_string())
            .or_default()
            .extend(servers);
        Ok(true)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn servers(&self, category: &str) -> impl Iterator<Item = &str> {
        self.categories
            .get(category)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn contains(&self, path: &DerivationPath) -> bool {
        match (self.categories.get(path.category_name()), path.server_name()) {
            (Some(servers), Some(server)) => servers.contains(server),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Every server path, in category then server order
    pub fn paths(&self) -> Result<Vec<DerivationPath>, PathError> {
        self.categories
            .iter()
            .flat_map(|(category, servers)| {
                servers
                    .iter()
                    .map(move |server| DerivationPath::server(category.as_str(), server.as_str()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKeys {
    pub path: DerivationPath,
    pub public_key: PublicKey,
    pub has_secret: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryKeys {
    pub category: String,
    pub public_key: PublicKey,
    pub servers: Vec<ServerKeys>,
}

/// Audit view of every key in a topology. Holds no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyListing {
    pub categories: Vec<CategoryKeys>,
}

impl fmt::Display for KeyListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in &self.categories {
            writeln!(f, "{}  {}", category.category, category.public_key)?;
            for server in &category.servers {
                let secret = if server.has_secret { "secret: ****" } else { "public only" };
                writeln!(f, "  {}  {}  ({})", server.path, server.public_key, secret)?;
            }
        }
        Ok(())
    }
}

/// Category public keys, enough to derive any server public key in the
/// fleet without holding a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicTree {
    categories: BTreeMap<String, PublicKey>,
}

impl PublicTree {
    pub fn export(master: &MasterKey, topology: &Topology) -> Self {
        let categories = topology
            .categories()
            .map(|category| {
                (
                    category.to_string(),
                    master.category_keypair(category).public_key(),
                )
            })
            .collect();
        Self { categories }
    }

    pub fn category_public_key(&self, category: &str) -> Option<PublicKey> {
        self.categories.get(category).copied()
    }

    pub fn server_public_key(&self, path: &DerivationPath) -> Result<PublicKey, TreeError> {
        let category = self
            .category_public_key(path.category_name())
            .ok_or_else(|| TreeError::UnknownCategory(path.category_name().to_string()))?;
        match path.server_name() {
            Some(server) => Ok(category.sub_key(server)?),
            None => Ok(category),
        }
    }
}

impl MasterKey {
    /// List every key in `topology`
    pub fn list_keys(&self, topology: &Topology) -> Result<KeyListing, DerivationError> {
        let mut categories = Vec::new();
        for category in topology.categories() {
            let keypair = self.category_keypair(category);
            let mut servers = Vec::new();
            for server in topology.servers(category) {
                let server_keys = keypair.sub_key(server)?;
                servers.push(ServerKeys {
                    path: DerivationPath::server(category, server)?,
                    public_key: server_keys.public_key(),
                    has_secret: server_keys.can_sign(),
                });
            }
            categories.push(CategoryKeys {
                category: category.to_string(),
                public_key: keypair.public_key(),
                servers,
            });
        }
        Ok(KeyListing { categories })
    }
}
