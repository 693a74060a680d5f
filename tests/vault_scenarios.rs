//! Key vault federation across two independently-backed vaults: read-through
//! lookup should stop at the first hit, and a write-through insert should
//! land in every vault, not just the one that produced the key.

mod common;

use vault_acquire::vault::local::LocalVault;
use vault_acquire::vault::{Vault, VaultEntry, VaultFederation};
use vault_acquire::Kid;

fn kid(hex: &str) -> Kid {
    Kid::from_hex(hex).expect("valid test kid")
}

#[tokio::test]
async fn read_through_stops_at_first_hit() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let primary = LocalVault::open("primary", dir.path().join("primary.json")).unwrap();
    let secondary = LocalVault::open("secondary", dir.path().join("secondary.json")).unwrap();

    let k = kid("00112233445566778899aabbccddeeff");
    secondary.insert(VaultEntry {
        service: "svc".into(),
        title_id: "t1".into(),
        kid: k.clone(),
        key: "only-in-secondary".into(),
    }).await.unwrap();
    secondary.commit().await.unwrap();

    let federation = VaultFederation::new(vec![Box::new(primary), Box::new(secondary)]);
    let (found, vault_name) = federation.get("svc", &k).await.unwrap().expect("key found in federation");
    assert_eq!(found.key, "only-in-secondary");
    assert_eq!(vault_name, "secondary");
}

#[tokio::test]
async fn write_through_replicates_to_every_vault() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let a_path = dir.path().join("a.json");
    let b_path = dir.path().join("b.json");
    let a = LocalVault::open("a", &a_path).unwrap();
    let b = LocalVault::open("b", &b_path).unwrap();

    let k = kid("aabbccddeeff00112233445566778899");
    let federation = VaultFederation::new(vec![Box::new(a), Box::new(b)]);
    federation.insert_everywhere(VaultEntry {
        service: "svc".into(),
        title_id: "t2".into(),
        kid: k.clone(),
        key: "shared-key".into(),
    }).await.unwrap();
    federation.commit_all().await.unwrap();

    // Reopen from disk independently to prove both vaults actually persisted
    // the write, not just the in-memory federation view.
    let a_reopened = LocalVault::open("a", &a_path).unwrap();
    let b_reopened = LocalVault::open("b", &b_path).unwrap();
    assert_eq!(a_reopened.get("svc", &k).await.unwrap().unwrap().key, "shared-key");
    assert_eq!(b_reopened.get("svc", &k).await.unwrap().unwrap().key, "shared-key");
}

#[tokio::test]
async fn no_vault_has_the_key_yields_none() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let only = LocalVault::open("only", dir.path().join("only.json")).unwrap();
    let federation = VaultFederation::new(vec![Box::new(only)]);
    let k = kid("ffffffffffffffffffffffffffffffff");
    assert!(federation.get("svc", &k).await.unwrap().is_none());
}
