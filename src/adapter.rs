//! `ServiceAdapter`: the boundary between this crate's pipeline and a
//! specific streaming service's catalog/login/license-proxy glue (spec
//! §6.1). Every adapter is a black box implementing this trait; the
//! pipeline never branches on a service name.
//!
//! Grounded on the shape of `original_source/vinetrimmer/services/__init__.py`
//! (a service module exposes title lookup, manifest URL resolution, and a
//! license-proxy call), generalized into one trait object the orchestrator
//! holds rather than a per-service subclass.

use async_trait::async_trait;

use crate::drm::LicenseTransport;
use crate::error::Result;
use crate::manifest::ManifestKind;
use crate::model::{MenuTrack, Title};

pub struct ManifestLocation {
    pub kind: ManifestKind,
    pub url: String,
}

#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve_title(&self, title_id: &str) -> Result<Title>;

    /// Enumerate every title this adapter's credentials can see (spec §6
    /// `get_titles`) — a season's episodes, an account's library, and so
    /// on. Adapters that only ever resolve one title by id at a time (the
    /// common case) can leave this at its default, empty-list behavior.
    async fn get_titles(&self) -> Result<Vec<Title>> {
        Ok(Vec::new())
    }

    async fn manifest_location(&self, title: &Title) -> Result<ManifestLocation>;

    /// Chapter/skip markers for a title (spec §6 `get_chapters`), if the
    /// service publishes any. Default: none.
    async fn get_chapters(&self, _title: &Title) -> Result<Vec<MenuTrack>> {
        Ok(Vec::new())
    }

    /// A Widevine service certificate to install before requesting a
    /// challenge (spec §6 `certificate`), when this service requires
    /// privacy mode. `None` means fall back to the CDM's common privacy
    /// cert, or no certificate at all for PlayReady.
    fn certificate(&self) -> Option<&[u8]> {
        None
    }

    /// A per-service DRM license transport, if this title is protected.
    /// Returns `None` for services that only ever serve clear content.
    fn license_transport(&self) -> Option<&dyn LicenseTransport>;

    /// Service-scoped KID quirks (for example Netflix's partial byte
    /// reorder, distinct from the generic little-endian UUID reversal
    /// every manifest format already gets) — see `SPEC_FULL.md`
    /// supplemented features. The default is "no quirk".
    fn kid_quirk(&self, kid_hex: &str) -> String {
        kid_hex.to_string()
    }
}
