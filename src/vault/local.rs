//! A LOCAL vault: a flat JSON file of `(kid -> key)` entries.
//!
//! No crate in the retrieval pack uses an embedded database (no
//! rusqlite/sqlx/sled/redb appears in any of the five example repos'
//! `Cargo.toml`s). `serde_json` is already a teacher dev-dependency and is
//! the serialization format of choice across the pack, so the local vault
//! is a `HashMap` persisted as JSON, batched in memory and flushed on
//! `commit` (DESIGN.md).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ContentKey, Kid};
use crate::vault::{InsertResult, Vault, VaultEntry, VaultKind};

#[derive(Serialize, Deserialize, Default)]
struct Store {
    entries: HashMap<String, StoredEntry>,
}

#[derive(Serialize, Deserialize, Clone)]
struct StoredEntry {
    service: String,
    title_id: String,
    key: String,
}

/// Entries are keyed on `(service, kid)`, not `kid` alone — two services
/// whose content happens to share a key id must land in different rows.
fn bucket_key(service: &str, kid: &Kid) -> String {
    format!("{service}\0{}", kid.as_hex())
}

pub struct LocalVault {
    name: String,
    path: PathBuf,
    store: Mutex<Store>,
    dirty: Mutex<bool>,
    /// When set, this vault only accepts entries for these services —
    /// anything else gets `InsertResult::Failure` ("no bucket for the
    /// given service", spec §4.5/§6.2). `None` means unrestricted.
    services: Option<HashSet<String>>,
}

impl LocalVault {
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| Error::Io(e, format!("reading vault {}", path.display())))?;
            serde_json::from_str(&text)
                .map_err(|e| Error::ManifestError(format!("parsing vault JSON: {e}")))?
        } else {
            Store::default()
        };
        Ok(LocalVault { name: name.into(), path, store: Mutex::new(store), dirty: Mutex::new(false), services: None })
    }

    /// Restrict this vault to the given set of services. Any insert for a
    /// service outside the set fails closed instead of silently storing
    /// under the wrong partition.
    pub fn restricted_to_services(mut self, services: impl IntoIterator<Item = String>) -> Self {
        self.services = Some(services.into_iter().collect());
        self
    }
}

#[async_trait]
impl Vault for LocalVault {
    fn kind(&self) -> VaultKind {
        VaultKind::Local
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, service: &str, kid: &Kid) -> Result<Option<ContentKey>> {
        let store = self.store.lock().unwrap();
        Ok(store.entries.get(&bucket_key(service, kid)).map(|e| ContentKey::new(kid.clone(), e.key.clone())))
    }

    async fn insert(&self, entry: VaultEntry) -> Result<InsertResult> {
        if let Some(services) = &self.services {
            if !services.contains(&entry.service) {
                return Ok(InsertResult::Failure);
            }
        }
        let mut store = self.store.lock().unwrap();
        let key = bucket_key(&entry.service, &entry.kid);
        if store.entries.contains_key(&key) {
            return Ok(InsertResult::AlreadyExists);
        }
        store.entries.insert(key, StoredEntry {
            service: entry.service,
            title_id: entry.title_id,
            key: entry.key,
        });
        *self.dirty.lock().unwrap() = true;
        Ok(InsertResult::Success)
    }

    async fn commit(&self) -> Result<()> {
        let mut dirty = self.dirty.lock().unwrap();
        if !*dirty {
            return Ok(());
        }
        let store = self.store.lock().unwrap();
        let text = serde_json::to_string_pretty(&*store)
            .map_err(|e| Error::Other(format!("serializing vault: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Io(e, format!("creating vault directory {}", parent.display())))?;
        }
        std::fs::write(&self.path, text)
            .map_err(|e| Error::Io(e, format!("writing vault {}", self.path.display())))?;
        *dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_insert_once() {
        let dir = tempfile::tempdir().unwrap();
        let vault = LocalVault::open("local", dir.path().join("keys.json")).unwrap();
        let kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let entry = VaultEntry { service: "svc".into(), title_id: "t1".into(), kid: kid.clone(), key: "aa".into() };
        assert_eq!(vault.insert(entry.clone()).await.unwrap(), InsertResult::Success);
        assert_eq!(vault.insert(entry).await.unwrap(), InsertResult::AlreadyExists);
        assert_eq!(vault.get("svc", &kid).await.unwrap().unwrap().key, "aa");
    }

    #[tokio::test]
    async fn commit_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        {
            let vault = LocalVault::open("local", &path).unwrap();
            vault.insert(VaultEntry { service: "svc".into(), title_id: "t1".into(), kid: kid.clone(), key: "aa".into() }).await.unwrap();
            vault.commit().await.unwrap();
        }
        let reopened = LocalVault::open("local", &path).unwrap();
        assert_eq!(reopened.get("svc", &kid).await.unwrap().unwrap().key, "aa");
    }

    #[tokio::test]
    async fn same_kid_different_services_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let vault = LocalVault::open("local", dir.path().join("keys.json")).unwrap();
        let kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        vault.insert(VaultEntry { service: "svc-a".into(), title_id: "t1".into(), kid: kid.clone(), key: "aa".into() }).await.unwrap();
        vault.insert(VaultEntry { service: "svc-b".into(), title_id: "t2".into(), kid: kid.clone(), key: "bb".into() }).await.unwrap();
        assert_eq!(vault.get("svc-a", &kid).await.unwrap().unwrap().key, "aa");
        assert_eq!(vault.get("svc-b", &kid).await.unwrap().unwrap().key, "bb");
    }

    #[tokio::test]
    async fn insert_fails_closed_for_an_unrecognised_service_partition() {
        let dir = tempfile::tempdir().unwrap();
        let vault = LocalVault::open("local", dir.path().join("keys.json")).unwrap()
            .restricted_to_services(["svc-a".to_string()]);
        let kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let entry = VaultEntry { service: "svc-b".into(), title_id: "t1".into(), kid, key: "aa".into() };
        assert_eq!(vault.insert(entry).await.unwrap(), InsertResult::Failure);
    }
}
