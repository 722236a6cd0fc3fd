//! Integration tests for the key tree

mod common;

use ::common::access::AccessLevel;
use ::common::auth::{ChallengeAuthenticator, ChallengeError};
use ::common::crypto::{KeyPair, Seed};
use ::common::keyring::MasterKey;
use ::common::recovery::RecoveryShare;
use ::common::tree::PublicTree;

#[test]
fn test_category_seeds_are_stable_and_distinct() {
    let master = MasterKey::from_seed(Seed::generate());

    let api_a = master.category_seed("api");
    let api_b = master.category_seed("api");
    assert_eq!(api_a.bytes(), api_b.bytes());
    assert_ne!(master.category_seed("api"), master.category_seed("db"));
}

#[test]
fn test_every_path_derives_identically_twice() {
    let seed = Seed::generate();
    let first = MasterKey::from_seed(seed.clone());
    let second = MasterKey::from_seed(seed);
    for path in common::sample_topology().paths().unwrap() {
        assert_eq!(
            first.keypair_for(&path).unwrap(),
            second.keypair_for(&path).unwrap()
        );
    }
}

#[test]
fn test_sibling_derivation_from_category_sign_grant() {
    let master = MasterKey::generate();
    let grant = common::grant(&master, "api/server1", AccessLevel::CategorySign);

    let share = RecoveryShare::create(&master, &common::path("api/server1"), &grant).unwrap();
    let server2 = share.keypair_for(&common::path("api/server2")).unwrap();
    assert_eq!(
        server2.public_key(),
        master.public_key_for(&common::path("api/server2")).unwrap()
    );

    // the sibling key signs, and the master-derived public key verifies it
    let signature = server2.sign(b"hello").unwrap();
    let expected = master.public_key_for(&common::path("api/server2")).unwrap();
    assert!(expected.verify(b"hello", &signature).is_ok());
}

#[test]
fn test_category_secret_does_not_reach_master() {
    let master = MasterKey::generate();
    let category = master.category_keypair("api");
    assert_ne!(category.public_key(), master.public_key());
    assert_ne!(
        KeyPair::from_seed(&master.category_seed("api")).public_key(),
        KeyPair::from_seed(&master.category_seed("db")).public_key()
    );
    // deriving "api" as a sub-key of the master is a different key again
    assert_ne!(
        master.keypair().sub_key("api").unwrap().public_key(),
        category.public_key()
    );
}

#[test]
fn test_public_tree_matches_listing() {
    let master = MasterKey::generate();
    let topology = common::sample_topology();
    let listing = master.list_keys(&topology).unwrap();
    let tree = PublicTree::export(&master, &topology);

    for category in &listing.categories {
        for server in &category.servers {
            assert_eq!(tree.server_public_key(&server.path).unwrap(), server.public_key);
        }
    }
    let json = serde_json::to_value(&tree).unwrap();
    assert_eq!(json["api"], master.category_keypair("api").public_key().to_hex());
}

#[test]
fn test_derived_server_key_redeems_challenge_once() {
    let master = MasterKey::generate();
    let keypair = master.keypair_for(&common::path("api/server1")).unwrap();
    let auth = ChallengeAuthenticator::new();

    let challenge = auth.create_challenge(Some(keypair.public_key()));
    let signature = ChallengeAuthenticator::sign_challenge(&keypair, &challenge.nonce).unwrap();

    assert_eq!(
        auth.verify_challenge(&challenge.id, &signature, &keypair.public_key()),
        Ok(())
    );
    assert_eq!(
        auth.verify_challenge(&challenge.id, &signature, &keypair.public_key()),
        Err(ChallengeError::NotFound)
    );
}
