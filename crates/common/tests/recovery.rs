//! Integration tests for recovery shares

mod common;

use std::sync::Arc;

use ::common::access::AccessLevel;
use ::common::keyring::MasterKey;
use ::common::liveness::{LivenessServer, ProbeKind, ProbeOptions, Prober, ServerIdentity};
use ::common::recovery::{RecoveryError, RecoveryShare, RecoveryStore, ShareKind};
use ::common::transport::{MemoryTransport, PeerTransport};
use tokio::sync::watch;

#[test]
fn test_redemption_is_exact_type_match() {
    let master = MasterKey::generate();
    let p = common::path("api/server1");
    let levels = [
        AccessLevel::PublicOnly,
        AccessLevel::CategoryRead,
        AccessLevel::CategorySign,
    ];
    let store = RecoveryStore::from_shares(levels.iter().map(|level| {
        let grant = common::grant(&master, "api/server1", *level);
        RecoveryShare::create(&master, &p, &grant).unwrap()
    }));

    for level in levels {
        let grant = common::grant(&master, "api/server1", level);
        let share = store.request(&p, &grant).unwrap();
        assert_eq!(share.kind(), ShareKind::for_level(level).unwrap());
    }
}

#[test]
fn test_stale_grant_rejected_at_redemption() {
    let master = MasterKey::generate();
    let p = common::path("api/server1");
    let grant = common::grant(&master, "api/server1", AccessLevel::PublicOnly);
    let store = RecoveryStore::from_shares([RecoveryShare::create(&master, &p, &grant).unwrap()]);

    // a grant cut for another server does not unlock this one
    let wrong = common::grant(&master, "api/server2", AccessLevel::PublicOnly);
    assert!(matches!(
        store.request(&p, &wrong),
        Err(RecoveryError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_recovered_server_proves_identity() {
    common::init_tracing();
    let master = MasterKey::generate();
    let p = common::path("db/primary");

    // issued while the master is online
    let grant = common::grant(&master, "db/primary", AccessLevel::CategorySign);
    let store = RecoveryStore::from_shares([RecoveryShare::create(&master, &p, &grant).unwrap()]);
    let json = serde_json::to_string(&store).unwrap();
    let expected = master.public_key_for(&p).unwrap();
    drop(master);

    // later, the server recovers from a peer's copy of the store
    let store: RecoveryStore = serde_json::from_str(&json).unwrap();
    let share = store.request(&p, &grant).unwrap();
    let keypair = share.keypair_for(&p).unwrap();
    assert_eq!(keypair.public_key(), expected);

    let transport = MemoryTransport::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let identity = ServerIdentity::new(p.clone(), keypair).unwrap();
    let shared: Arc<dyn PeerTransport> = Arc::new(transport.clone());
    let handle = LivenessServer::new(identity)
        .spawn(shared.clone(), shutdown_rx)
        .await
        .unwrap();

    let report = Prober::new(shared)
        .check_aliveness(&expected, &ProbeOptions::new(ProbeKind::Challenge))
        .await
        .unwrap();
    assert_eq!(report.verified, Some(true));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
