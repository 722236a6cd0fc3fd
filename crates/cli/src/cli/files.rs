//! JSON documents the CLI reads and writes: grants, share stores, tokens.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FileError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| FileError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| FileError::Json {
        path: display,
        source,
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let display = path.display().to_string();
    let contents = serde_json::to_string_pretty(value).map_err(|source| FileError::Json {
        path: display.clone(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| FileError::Write {
        path: display,
        source,
    })
}

/// Like [`write_json`], but readable by the owner only. Grants and share
/// stores can carry category or master seeds.
pub fn write_secret_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let display = path.display().to_string();
    let contents = serde_json::to_string_pretty(value).map_err(|source| FileError::Json {
        path: display.clone(),
        source,
    })?;
    let write_err = |source| FileError::Write {
        path: display.clone(),
        source,
    };
    let mut file = open_owner_only(path).map_err(write_err)?;
    file.write_all(contents.as_bytes()).map_err(write_err)
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode only applies on creation; tighten files that already existed
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
