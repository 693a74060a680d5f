//! Key vault federation: read-through lookup across an ordered list of
//! vaults, write-through replication of newly acquired keys, and
//! insert-once semantics so a key is never silently overwritten (spec
//! §4.5). No `vaults.py` is present in the distilled Python source this
//! crate is ported from; the federation's required behaviour here is
//! inferred from spec §4.5/§6 and from `dl.py`'s call sites
//! (`ctx.obj.vaults.get(kid, title_id)`, `insert_key`, `commit`).

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ContentKey, Kid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Success,
    AlreadyExists,
    Failure,
}

/// One vault entry as persisted: the key plus enough provenance to explain
/// where it came from on a later run (spec §3's `VaultEntry`).
#[derive(Debug, Clone)]
pub struct VaultEntry {
    pub service: String,
    pub title_id: String,
    pub kid: Kid,
    pub key: String,
}

#[async_trait]
pub trait Vault: Send + Sync {
    fn kind(&self) -> VaultKind;
    fn name(&self) -> &str;

    /// Uniqueness is on `(service, kid)`, not `kid` alone (spec §4.5/§6.2)
    /// — two services whose content happens to share a KID must not
    /// collide.
    async fn get(&self, service: &str, kid: &Kid) -> Result<Option<ContentKey>>;

    /// Insert a key, failing closed (`AlreadyExists`) rather than
    /// overwriting — a vault is a cache of ground truth, not a place to
    /// paper over a service rotating a key id.
    async fn insert(&self, entry: VaultEntry) -> Result<InsertResult>;

    /// Flush any batched writes. Local (file-backed) vaults batch inserts
    /// in memory and only persist on `commit`; remote vaults can treat
    /// this as a no-op.
    async fn commit(&self) -> Result<()>;
}

/// An ordered federation of vaults. Lookup tries each vault in order and
/// returns the first hit; a successful acquisition is written through to
/// every vault in the list (spec §4.5).
pub struct VaultFederation {
    vaults: Vec<Box<dyn Vault>>,
}

impl VaultFederation {
    pub fn new(vaults: Vec<Box<dyn Vault>>) -> Self {
        VaultFederation { vaults }
    }

    /// Read-through lookup: the vault that produced the hit is returned
    /// alongside the key so callers can log provenance, matching the
    /// Python original's `(key, vault_used)` return shape.
    pub async fn get(&self, service: &str, kid: &Kid) -> Result<Option<(ContentKey, &str)>> {
        for vault in &self.vaults {
            if let Some(key) = vault.get(service, kid).await? {
                return Ok(Some((key, vault.name())));
            }
        }
        Ok(None)
    }

    /// Write a newly acquired key to every vault in the federation.
    /// `AlreadyExists` on any individual vault is not an error — it just
    /// means that vault already agreed with us.
    pub async fn insert_everywhere(&self, entry: VaultEntry) -> Result<()> {
        for vault in &self.vaults {
            let _ = vault.insert(entry.clone()).await?;
        }
        Ok(())
    }

    pub async fn commit_all(&self) -> Result<()> {
        for vault in &self.vaults {
            vault.commit().await?;
        }
        Ok(())
    }
}
