//! Shared helpers for keyring integration tests
#![allow(dead_code)]

use common::access::{AccessGrant, AccessLevel};
use common::keyring::MasterKey;
use common::path::DerivationPath;
use common::tree::Topology;

/// Parse a path, panicking on malformed input
pub fn path(s: &str) -> DerivationPath {
    s.parse().unwrap()
}

/// `api = {server1, server2}`, `db = {primary}`
pub fn sample_topology() -> Topology {
    let mut topology = Topology::new();
    topology.add_server("api", "server1").unwrap();
    topology.add_server("api", "server2").unwrap();
    topology.add_server("db", "primary").unwrap();
    topology
}

pub fn grant(master: &MasterKey, target: &str, level: AccessLevel) -> AccessGrant {
    AccessGrant::issue(master, &path(target), level).unwrap()
}

/// Route test logs through tracing when RUST_LOG is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
