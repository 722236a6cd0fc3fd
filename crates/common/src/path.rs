use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Errors raised when parsing or constructing a derivation path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl From<PathError> for crate::crypto::DerivationError {
    fn from(err: PathError) -> Self {
        crate::crypto::DerivationError::InvalidPath(err.to_string())
    }
}

/// Address of a node in the key tree: `category` or `category/server`.
///
/// Both segments must be non-empty and free of `/`. Paths are compared
/// segment by segment, which is what access checks rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct DerivationPath {
    category: String,
    server: Option<String>,
}

fn check_segment(path: &str, segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment",
        });
    }
    if segment.contains('/') {
        return Err(PathError::InvalidPath {
            path: path.to_string(),
            reason: "segment contains a separator",
        });
    }
    Ok(())
}

impl DerivationPath {
    /// Address a single server within a category
    pub fn server(category: impl Into<String>, server: impl Into<String>) -> Result<Self, PathError> {
        let category = category.into();
        let server = server.into();
        let display = format!("{}/{}", category, server);
        check_segment(&display, &category)?;
        check_segment(&display, &server)?;
        Ok(Self {
            category,
            server: Some(server),
        })
    }

    /// Address a whole category
    pub fn category(category: impl Into<String>) -> Result<Self, PathError> {
        let category = category.into();
        check_segment(&category, &category)?;
        Ok(Self {
            category,
            server: None,
        })
    }

    pub fn category_name(&self) -> &str {
        &self.category
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn is_category(&self) -> bool {
        self.server.is_none()
    }

    /// The category this path belongs to, as a path of its own
    pub fn category_path(&self) -> DerivationPath {
        Self {
            category: self.category.clone(),
            server: None,
        }
    }

    pub fn same_category(&self, other: &DerivationPath) -> bool {
        self.category == other.category
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server {
            Some(server) => write!(f, "{}/{}", self.category, server),
            None => f.write_str(&self.category),
        }
    }
}

impl FromStr for DerivationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::InvalidPath {
                path: String::new(),
                reason: "empty path",
            });
        }
        let segments: Vec<&str> = s.split('/').collect();
        for segment in &segments {
            check_segment(s, segment)?;
        }
        match segments.as_slice() {
            [category] => Self::category(*category),
            [category, server] => Self::server(*category, *server),
            _ => Err(PathError::InvalidPath {
                path: s.to_string(),
                reason: "expected category or category/server",
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_server_path() {
        let path: DerivationPath = "api/server1".parse().unwrap();
        assert_eq!(path.category_name(), "api");
        assert_eq!(path.server_name(), Some("server1"));
        assert!(!path.is_category());
        assert_eq!(path.to_string(), "api/server1");
    }

    #[test]
    fn test_parse_category_path() {
        let path: DerivationPath = "db".parse().unwrap();
        assert!(path.is_category());
        assert_eq!(path.server_name(), None);
        assert_eq!(path.category_path(), path);
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for bad in ["", "/", "api/", "/server1", "api//server1", "a/b/c"] {
            assert!(bad.parse::<DerivationPath>().is_err(), "accepted {:?}", bad);
        }
        assert!(DerivationPath::server("api", "").is_err());
        assert!(DerivationPath::category("a/b").is_err());
    }

    #[test]
    fn test_same_category() {
        let a: DerivationPath = "api/server1".parse().unwrap();
        let b: DerivationPath = "api/server2".parse().unwrap();
        let c: DerivationPath = "db/primary".parse().unwrap();
        assert!(a.same_category(&b));
        assert!(!a.same_category(&c));
    }

    #[test]
    fn test_serde_as_string() {
        let path: DerivationPath = "cache/redis1".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"cache/redis1\"");
        let back: DerivationPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
