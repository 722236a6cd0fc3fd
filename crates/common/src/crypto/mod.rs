//! Cryptographic primitives for keyring fleets
//!
//! This module provides the key-derivation tree every other component builds on:
//!
//! - **Seeds**: 32-byte secrets at master and category scope
//! - **Keypairs**: Ed25519 public keys with an optional secret scalar
//! - **Derivation**: one-way tweaks that walk `category/server` paths
//!
//! # Key Tree
//!
//! ```text
//! master seed
//!   └── H(master || "api")  = category seed  → category keypair
//!         ├── tweak("server1")                → server keypair
//!         └── tweak("server2")                → server keypair
//! ```
//!
//! A category seed derives every server key below it (sibling derivation).
//! A category public key derives every server *public* key below it. Nothing
//! in the tree lets a holder walk upward to the master, or across to another
//! category.

mod derivation;
mod keys;

pub use derivation::derive_category_seed;
pub use ed25519_dalek::Signature;
pub use keys::{
    signature_hex, DerivationError, KeyError, KeyPair, PublicKey, Seed, PUBLIC_KEY_SIZE, SEED_SIZE,
    SIGNATURE_SIZE,
};

pub(crate) use keys::random_bytes;
