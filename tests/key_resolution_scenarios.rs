//! `Orchestrator::resolve_keys` exercised against fakes instead of a live
//! CDM or license server: the static-key shortcut, the vault read-through
//! shortcut, and a full DRM session with HDCP test-key filtering.

mod common;

use async_trait::async_trait;

use vault_acquire::adapter::{ManifestLocation, ServiceAdapter};
use vault_acquire::drm::{Cdm, DrmSystem, LicenseTransport, SessionId};
use vault_acquire::orchestrator::Orchestrator;
use vault_acquire::vault::local::LocalVault;
use vault_acquire::vault::{Vault, VaultEntry, VaultFederation};
use vault_acquire::{ContentKey, Config, Descriptor, Kid, Title, Track, TrackKind, VideoTrack, HdrFormat};

struct FakeTransport;

#[async_trait]
impl LicenseTransport for FakeTransport {
    async fn exchange(&self, _challenge: Vec<u8>, _title_id: &str, _track_id: &str, _session_id: &str) -> vault_acquire::Result<Vec<u8>> {
        Ok(vec![0xde, 0xad])
    }
}

struct FakeAdapter {
    transport: FakeTransport,
}

#[async_trait]
impl ServiceAdapter for FakeAdapter {
    fn name(&self) -> &str {
        "fake-service"
    }

    async fn resolve_title(&self, _title_id: &str) -> vault_acquire::Result<Title> {
        unimplemented!("not exercised by the key-resolution scenario")
    }

    async fn manifest_location(&self, _title: &Title) -> vault_acquire::Result<ManifestLocation> {
        unimplemented!("not exercised by the key-resolution scenario")
    }

    fn license_transport(&self) -> Option<&dyn LicenseTransport> {
        Some(&self.transport)
    }
}

struct FakeCdm {
    keys: Vec<ContentKey>,
}

#[async_trait]
impl Cdm for FakeCdm {
    fn system(&self) -> DrmSystem {
        DrmSystem::Widevine
    }

    async fn open(&self) -> vault_acquire::Result<SessionId> {
        Ok(SessionId("fake-session".into()))
    }

    async fn set_service_certificate(&self, _session: &SessionId, _cert: &[u8]) -> vault_acquire::Result<()> {
        Ok(())
    }

    async fn get_license_challenge(&self, _session: &SessionId, _pssh: &[u8]) -> vault_acquire::Result<Vec<u8>> {
        Ok(vec![1, 2, 3])
    }

    async fn parse_license(&self, _session: &SessionId, _license_response: &[u8]) -> vault_acquire::Result<()> {
        Ok(())
    }

    async fn get_keys(&self, _session: &SessionId) -> vault_acquire::Result<Vec<ContentKey>> {
        Ok(self.keys.clone())
    }

    async fn close(&self, _session: &SessionId) -> vault_acquire::Result<()> {
        Ok(())
    }
}

fn video_track(id: &str, kid: Option<Kid>, pssh: Option<Vec<u8>>, encrypted: bool) -> Track {
    let mut t = Track::new(
        id,
        "en",
        Descriptor::Dash { init_url: None, segment_urls: vec![] },
        TrackKind::Video(VideoTrack {
            codec: "hvc1".into(),
            width: 1920,
            height: 1080,
            bitrate: 4_000_000,
            fps: Some(23.976),
            hdr: HdrFormat::None,
            range_name: "SDR".into(),
        }),
    );
    t.kid = kid;
    t.pssh = pssh;
    t.encrypted = encrypted;
    t
}

#[tokio::test]
async fn static_key_shortcuts_drm_entirely() {
    common::setup_logging();
    let k = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
    let mut track = video_track("v1", Some(k.clone()), None, true);
    track.static_key = Some("aabbccddeeff00112233445566778899".into());

    let adapter = FakeAdapter { transport: FakeTransport };
    // No vaults and no CDM configured at all: if the static-key shortcut
    // didn't fire, anything past it would panic on `self.cdm.ok_or(...)`.
    let orch = Orchestrator::new(Config::new(), VaultFederation::new(vec![]), &adapter, None);

    let keys = orch.resolve_keys(&track, "t1").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].kid, k);
    assert_eq!(keys[0].key, "aabbccddeeff00112233445566778899");
}

#[tokio::test]
async fn vault_hit_shortcuts_live_drm_session() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let vault = LocalVault::open("local", dir.path().join("keys.json")).unwrap();
    let k = Kid::from_hex("11223344556677889900aabbccddeeff").unwrap();
    vault.insert(VaultEntry {
        service: "fake-service".into(),
        title_id: "v2".into(),
        kid: k.clone(),
        key: "from-vault".into(),
    }).await.unwrap();

    let track = video_track("v2", Some(k.clone()), Some(vec![0u8; 8]), true);
    let adapter = FakeAdapter { transport: FakeTransport };
    let federation = VaultFederation::new(vec![Box::new(vault)]);
    // No CDM configured: a vault miss here would panic on `self.cdm.ok_or(...)`,
    // so this only passes if the vault hit actually short-circuits.
    let orch = Orchestrator::new(Config::new(), federation, &adapter, None);

    let keys = orch.resolve_keys(&track, "t1").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key, "from-vault");
}

#[tokio::test]
async fn full_drm_session_filters_hdcp_test_key_and_writes_back_to_vault() {
    common::setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let vault = LocalVault::open("local", dir.path().join("keys.json")).unwrap();
    let real_kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
    let hdcp_kid = Kid::from_hex("b770d5b4bb6b594daf985845aae9aa5f").unwrap();

    let track = video_track("v3", Some(real_kid.clone()), Some(vec![0u8; 16]), true);
    let adapter = FakeAdapter { transport: FakeTransport };
    let cdm = FakeCdm {
        keys: vec![
            ContentKey::new(real_kid.clone(), "real-key"),
            ContentKey::new(hdcp_kid, "hdcp-watermark-key"),
        ],
    };
    let vault_path = dir.path().join("keys.json");
    let federation = VaultFederation::new(vec![Box::new(vault)]);
    let orch = Orchestrator::new(Config::new(), federation, &adapter, Some(&cdm));

    let keys = orch.resolve_keys(&track, "t1").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].kid, real_kid);
    assert_eq!(keys[0].key, "real-key");

    // The orchestrator commits the federation after a live acquisition, so a
    // fresh vault opened from the same path should already see the write-back.
    let reopened = LocalVault::open("local", &vault_path).unwrap();
    assert_eq!(reopened.get("fake-service", &real_kid).await.unwrap().unwrap().key, "real-key");
}
