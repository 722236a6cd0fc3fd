use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use common::crypto::{PublicKey, Seed};
use common::keyring::MasterKey;
use common::liveness::{ProbeOptions, DEFAULT_MONITOR_INTERVAL, DEFAULT_PROBE_TIMEOUT};
use common::path::DerivationPath;
use common::tree::Topology;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "keyring";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SEED_FILE_NAME: &str = "master.seed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Cap on concurrent probes; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

fn default_interval_ms() -> u64 {
    DEFAULT_MONITOR_INTERVAL.as_millis() as u64
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
            max_concurrency: None,
        }
    }
}

impl ProbeConfig {
    pub fn options(&self) -> ProbeOptions {
        let options = ProbeOptions::default().with_timeout(Duration::from_millis(self.timeout_ms));
        match self.max_concurrency {
            Some(limit) => options.with_max_concurrency(limit),
            None => options,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level for long-running commands, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Fleet topology: category -> servers
    #[serde(default)]
    pub categories: Topology,
    /// Address book for the TCP transport: "category/server" -> "host:port"
    #[serde(default)]
    pub peers: BTreeMap<DerivationPath, SocketAddr>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            probe: ProbeConfig::default(),
            categories: Topology::default(),
            peers: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the keyring directory (~/.keyring)
    pub keyring_dir: PathBuf,
    /// Path to the hex-encoded master seed
    pub seed_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the keyring directory path (custom or default ~/.keyring)
    pub fn keyring_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new keyring directory, generating a master seed unless
    /// one is supplied
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
        seed: Option<Seed>,
    ) -> Result<Self, StateError> {
        let keyring_dir = Self::keyring_dir(custom_path)?;
        if keyring_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&keyring_dir)?;

        let seed = seed.unwrap_or_else(Seed::generate);
        let seed_path = keyring_dir.join(SEED_FILE_NAME);
        write_secret(&seed_path, &seed.to_hex())?;

        let config = config.unwrap_or_default();
        let config_path = keyring_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            keyring_dir,
            seed_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the keyring directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let keyring_dir = Self::keyring_dir(custom_path)?;
        if !keyring_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let seed_path = keyring_dir.join(SEED_FILE_NAME);
        let config_path = keyring_dir.join(CONFIG_FILE_NAME);
        if !seed_path.exists() {
            return Err(StateError::MissingFile(SEED_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        Ok(Self {
            keyring_dir,
            seed_path,
            config_path,
            config,
        })
    }

    pub fn load_master(&self) -> Result<MasterKey, StateError> {
        let hex = fs::read_to_string(&self.seed_path)?;
        MasterKey::from_hex(&hex).map_err(|e| StateError::InvalidSeed(e.to_string()))
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Public key -> socket address for every configured peer
    pub fn address_book(
        &self,
        master: &MasterKey,
    ) -> Result<HashMap<PublicKey, SocketAddr>, StateError> {
        self.config
            .peers
            .iter()
            .map(|(path, addr)| {
                let public_key = master
                    .public_key_for(path)
                    .map_err(|e| StateError::InvalidPeer(path.to_string(), e.to_string()))?;
                Ok((public_key, *addr))
            })
            .collect()
    }

    /// The given paths, or every server in the topology when none are given
    pub fn resolve_targets(
        &self,
        paths: &[DerivationPath],
    ) -> Result<Vec<DerivationPath>, StateError> {
        if !paths.is_empty() {
            return Ok(paths.to_vec());
        }
        self.config
            .categories
            .paths()
            .map_err(|e| StateError::InvalidTopology(e.to_string()))
    }
}

#[cfg(unix)]
fn write_secret(path: &Path, contents: &str) -> Result<(), StateError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, contents: &str) -> Result<(), StateError> {
    fs::write(path, contents)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("keyring directory not initialized. Run 'keyring init' first")]
    NotInitialized,

    #[error("keyring directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid master seed: {0}")]
    InvalidSeed(String),

    #[error("invalid peer {0}: {1}")]
    InvalidPeer(String, String),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
