//! Integration tests for grants, escalation and delegation

mod common;

use ::common::access::{AccessGrant, AccessLevel, Capability, DenialReason, GrantRequest};
use ::common::keyring::MasterKey;

const LEVELS: [AccessLevel; 5] = [
    AccessLevel::None,
    AccessLevel::PublicOnly,
    AccessLevel::CategoryRead,
    AccessLevel::CategorySign,
    AccessLevel::FullControl,
];

#[test]
fn test_public_only_path_mismatch() {
    let master = MasterKey::generate();
    let grant = common::grant(&master, "cache/redis1", AccessLevel::PublicOnly);

    let decision = grant.verify_access(&common::path("cache/redis2"));
    assert!(!decision.is_allowed());
    assert_eq!(decision.reason(), Some(DenialReason::PathMismatch));
    assert_eq!(decision.reason().unwrap().to_string(), "Path mismatch");
}

#[test]
fn test_category_sign_never_crosses_categories() {
    let master = MasterKey::generate();
    let topology = common::sample_topology();
    for server in topology.servers("api") {
        let grant = common::grant(&master, &format!("api/{}", server), AccessLevel::CategorySign);
        for other in topology.servers("db") {
            let denied = grant.verify_access(&common::path(&format!("db/{}", other)));
            assert!(!denied.is_allowed());
        }
    }
}

#[test]
fn test_escalation_table() {
    let master = MasterKey::generate();
    let same = common::path("api/server2");
    let other = common::path("db/primary");

    for held in LEVELS {
        let grant = common::grant(&master, "api/server1", held);
        for requested in LEVELS {
            for target in [&same, &other] {
                let request = GrantRequest::new(requested, target.clone());
                let expected = match held {
                    AccessLevel::FullControl => true,
                    AccessLevel::CategorySign => {
                        target == &same && requested <= AccessLevel::CategoryRead
                    }
                    _ => false,
                };
                assert_eq!(
                    grant.can_escalate(&request),
                    expected,
                    "{} -> {} on {}",
                    held,
                    requested,
                    target
                );
            }
        }
    }
}

#[test]
fn test_delegated_grants_stay_in_scope() {
    let master = MasterKey::generate();
    let full = common::grant(&master, "api/server1", AccessLevel::FullControl);

    let sign = full
        .delegate(&GrantRequest::new(
            AccessLevel::CategorySign,
            common::path("api/server1"),
        ))
        .unwrap();
    let read = sign
        .delegate(&GrantRequest::new(
            AccessLevel::CategoryRead,
            common::path("api/server2"),
        ))
        .unwrap();

    assert!(read
        .verify_access(&common::path("api/server1"))
        .allows(Capability::DerivePublic));
    assert!(!read
        .verify_access(&common::path("api/server1"))
        .allows(Capability::Sign));
    assert!(read
        .delegate(&GrantRequest::new(
            AccessLevel::PublicOnly,
            common::path("api/server1"),
        ))
        .is_err());
}

#[test]
fn test_grant_survives_json() {
    let master = MasterKey::generate();
    for level in LEVELS {
        let grant = common::grant(&master, "db/primary", level);
        let json = serde_json::to_string(&grant).unwrap();
        let back: AccessGrant = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level(), level);
        assert_eq!(
            back.verify_access(&common::path("db/primary")),
            grant.verify_access(&common::path("db/primary"))
        );
    }
}
