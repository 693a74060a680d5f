//! DRM session orchestration against an abstract CDM.
//!
//! The Python original dispatches between Widevine and PlayReady CDMs by
//! duck-typing (`"common_privacy_cert" in dir(cdm)`). `DrmSystem` replaces
//! that with an explicit discriminator the caller sets once, per REDESIGN
//! FLAGS in `SPEC_FULL.md` §9. The six-step session protocol (open, set
//! service certificate, get challenge, exchange with the license server,
//! parse license, get keys, close) is spec §4.4; it's the same shape for
//! both DRM systems, which is why one `Cdm` trait covers both.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{ContentKey, Kid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrmSystem {
    Widevine,
    PlayReady,
}

/// A CDM session handle, opaque to everything outside the `Cdm`
/// implementation.
pub struct SessionId(pub String);

/// Abstract content decryption module. Real implementations wrap a vendor
/// CDM client library or a remote license proxy; this crate never
/// implements the cryptography itself (spec Non-goals).
#[async_trait]
pub trait Cdm: Send + Sync {
    fn system(&self) -> DrmSystem;

    async fn open(&self) -> Result<SessionId>;

    /// Widevine-only: install the common privacy cert before requesting a
    /// challenge, when the service requires privacy mode. A no-op for
    /// PlayReady CDMs.
    async fn set_service_certificate(&self, session: &SessionId, cert: &[u8]) -> Result<()>;

    async fn get_license_challenge(&self, session: &SessionId, pssh: &[u8]) -> Result<Vec<u8>>;

    async fn parse_license(&self, session: &SessionId, license_response: &[u8]) -> Result<()>;

    async fn get_keys(&self, session: &SessionId) -> Result<Vec<ContentKey>>;

    async fn close(&self, session: &SessionId) -> Result<()>;
}

/// Sends a license challenge to the service's license server and returns
/// its raw response. Implemented per service (spec §6.1 `ServiceAdapter`
/// `license(challenge, title, track, session_id)`); `title_id`/`track_id`/
/// `session_id` are opaque to `DrmSession` and exist only so an adapter can
/// sign or route the request correctly.
#[async_trait]
pub trait LicenseTransport: Send + Sync {
    async fn exchange(&self, challenge: Vec<u8>, title_id: &str, track_id: &str, session_id: &str) -> Result<Vec<u8>>;
}

/// Drives one CDM session end to end for a single track's PSSH, producing
/// the content keys it yields (spec §4.4).
pub struct DrmSession<'a> {
    cdm: &'a dyn Cdm,
    service_certificate: Option<Vec<u8>>,
}

impl<'a> DrmSession<'a> {
    pub fn new(cdm: &'a dyn Cdm) -> Self {
        DrmSession { cdm, service_certificate: None }
    }

    pub fn with_service_certificate(mut self, cert: Vec<u8>) -> Self {
        self.service_certificate = Some(cert);
        self
    }

    /// Drive the session to completion and return the single key matching
    /// `target_kid` (spec §4.4 step 6). A CDM that hands back keys for
    /// other KIDs in the same response (common with multi-key Widevine
    /// licenses) never leaks past this call — anything that isn't the
    /// track's own kid, and anything that is an HDCP watermark test key,
    /// is filtered before the match is attempted.
    pub async fn acquire_keys(&self, pssh: &[u8], target_kid: &Kid, title_id: &str, track_id: &str, transport: &dyn LicenseTransport) -> Result<ContentKey> {
        let session = self.cdm.open().await?;
        let result = self.acquire_keys_inner(&session, pssh, target_kid, title_id, track_id, transport).await;
        // Always attempt to close the session, but don't let a close
        // failure mask the real error from the acquisition itself.
        let _ = self.cdm.close(&session).await;
        result
    }

    async fn acquire_keys_inner(&self, session: &SessionId, pssh: &[u8], target_kid: &Kid, title_id: &str, track_id: &str, transport: &dyn LicenseTransport) -> Result<ContentKey> {
        if let Some(cert) = &self.service_certificate {
            self.cdm.set_service_certificate(session, cert).await?;
        }
        let challenge = self.cdm.get_license_challenge(session, pssh).await?;
        let response = transport.exchange(challenge, title_id, track_id, &session.0).await
            .map_err(|e| Error::LicenseRefused(e.to_string()))?;
        self.cdm.parse_license(session, &response).await?;
        let keys = self.cdm.get_keys(session).await?;
        keys.into_iter()
            .filter(|k| !ContentKey::is_hdcp_test_key(&k.kid))
            .find(|k| &k.kid == target_kid)
            .ok_or_else(|| Error::NoContentKey(target_kid.as_hex().to_string()))
    }
}

/// A key already known for a track (static key, or a hit in the vault
/// federation) short-circuits `DrmSession` entirely — see the "Static
/// per-track keys" supplemented feature in `SPEC_FULL.md`.
pub fn kid_already_resolved(kid: &Kid, known: &[ContentKey]) -> Option<ContentKey> {
    known.iter().find(|k| &k.kid == kid).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeCdm {
        system: DrmSystem,
        keys: Vec<ContentKey>,
        opened: Mutex<bool>,
    }

    #[async_trait]
    impl Cdm for FakeCdm {
        fn system(&self) -> DrmSystem { self.system }
        async fn open(&self) -> Result<SessionId> {
            *self.opened.lock().unwrap() = true;
            Ok(SessionId("sess-1".into()))
        }
        async fn set_service_certificate(&self, _s: &SessionId, _c: &[u8]) -> Result<()> { Ok(()) }
        async fn get_license_challenge(&self, _s: &SessionId, _pssh: &[u8]) -> Result<Vec<u8>> { Ok(vec![1,2,3]) }
        async fn parse_license(&self, _s: &SessionId, _resp: &[u8]) -> Result<()> { Ok(()) }
        async fn get_keys(&self, _s: &SessionId) -> Result<Vec<ContentKey>> { Ok(self.keys.clone()) }
        async fn close(&self, _s: &SessionId) -> Result<()> { Ok(()) }
    }

    struct FakeTransport;
    #[async_trait]
    impl LicenseTransport for FakeTransport {
        async fn exchange(&self, _challenge: Vec<u8>, _title_id: &str, _track_id: &str, _session_id: &str) -> Result<Vec<u8>> { Ok(vec![9,9,9]) }
    }

    #[tokio::test]
    async fn filters_hdcp_test_key_from_result() {
        let real_kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let hdcp_kid = Kid::from_hex("b770d5b4bb6b594daf985845aae9aa5f").unwrap();
        let cdm = FakeCdm {
            system: DrmSystem::Widevine,
            keys: vec![
                ContentKey::new(real_kid.clone(), "aa"),
                ContentKey::new(hdcp_kid, "bb"),
            ],
            opened: Mutex::new(false),
        };
        let session = DrmSession::new(&cdm);
        let key = session.acquire_keys(&[0u8; 4], &real_kid, "title-1", "track-1", &FakeTransport).await.unwrap();
        assert_eq!(key.kid, real_kid);
        assert!(*cdm.opened.lock().unwrap());
    }

    #[tokio::test]
    async fn unrelated_kid_in_response_yields_no_content_key() {
        let target_kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let other_kid = Kid::from_hex("ffeeddccbbaa99887766554433221100").unwrap();
        let cdm = FakeCdm {
            system: DrmSystem::Widevine,
            keys: vec![ContentKey::new(other_kid, "bb")],
            opened: Mutex::new(false),
        };
        let session = DrmSession::new(&cdm);
        let err = session.acquire_keys(&[0u8; 4], &target_kid, "title-1", "track-1", &FakeTransport).await.unwrap_err();
        assert!(matches!(err, Error::NoContentKey(_)));
    }
}
