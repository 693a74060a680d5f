//! Track model: one variant per media kind instead of a class hierarchy.

use std::path::PathBuf;

use crate::model::key::Kid;

/// Where a track's segments come from, and how they're addressed.
///
/// Mirrors the three manifest families this crate parses (spec §4.1):
/// DASH segment addressing is resolved to a list of URLs ahead of time, an
/// HLS track is a media playlist URL the downloader walks itself (its
/// segment list can only be known once the longest continuous
/// discontinuity span has been picked from the fetched playlist), and an
/// ISM track carries its fragment template and chunk start times
/// unexpanded — the `{bitrate}`/`{start time}` tokens are substituted per
/// segment at download time (spec §4.1/§4.3), the same way HLS expansion
/// happens downstream of parsing rather than inside it.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Dash { init_url: Option<String>, segment_urls: Vec<String> },
    Hls { playlist_url: String },
    Ism { template: String, bitrate: u64, start_times: Vec<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdrFormat {
    None,
    Hdr10,
    Hdr10Plus,
    Hlg,
    DolbyVision,
    // HDR10 base layer plus a Dolby Vision enhancement layer, produced by
    // the hybrid compositor (spec §4.9) rather than present on ingestion.
    Hdr10PlusDolbyVisionHybrid,
}

#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub fps: Option<f64>,
    pub hdr: HdrFormat,
    pub range_name: String,
}

#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub codec: String,
    pub bitrate: u64,
    pub channels: Option<f32>,
    pub descriptive: bool,
    pub atmos: bool,
}

#[derive(Debug, Clone)]
pub struct TextTrack {
    pub codec: String,
    pub sdh: bool,
    pub forced: bool,
    pub closed_caption: bool,
}

#[derive(Debug, Clone)]
pub struct MenuTrack {
    /// OGM-style chapter markers: (timestamp, title), written straight into
    /// the `--chapters` file handed to mkvmerge (spec §4.10).
    pub chapters: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum TrackKind {
    Video(VideoTrack),
    Audio(AudioTrack),
    Text(TextTrack),
    Menu(MenuTrack),
}

impl TrackKind {
    pub fn sort_rank(&self) -> u8 {
        match self {
            TrackKind::Video(_) => 0,
            TrackKind::Audio(_) => 1,
            TrackKind::Text(_) => 2,
            TrackKind::Menu(_) => 3,
        }
    }
}

/// The manifest-specific identity a track's `extra` bag carries, so a
/// caller that needs to go back to the manifest (to re-resolve a template
/// or look up a sibling representation) can pattern-match instead of
/// parsing `id` back apart (DESIGN NOTES: "type-tag per track kind").
#[derive(Debug, Clone)]
pub enum TrackExtra {
    None,
    MpdRepresentation { representation_id: String },
    HlsPlaylistItem { variant_index: usize },
    IsmQualityLevel { stream_index: String, quality_level: String },
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    /// Adapter tag identifying which service produced this track, set by
    /// the orchestrator once a `ServiceAdapter` hands back its TrackSet.
    pub source: String,
    pub language: String,
    pub original_language: bool,
    pub descriptor: Descriptor,
    /// A key already known before DRM session negotiation — the original's
    /// "(Static)" key path (`SPEC_FULL.md` supplemented features). When set,
    /// `DrmSession` skips license acquisition entirely for this track.
    pub static_key: Option<String>,
    pub kid: Option<Kid>,
    pub pssh: Option<Vec<u8>>,
    pub encrypted: bool,
    /// When false, the track never carries a proxy regardless of what the
    /// orchestrator's own proxy configuration says (spec §4.3).
    pub needs_proxy: bool,
    pub needs_repack: bool,
    pub extra: TrackExtra,
    /// Populated once the Downloader has written this track to disk;
    /// `None` until then, per the `unset -> downloaded -> ...` lifecycle.
    pub location: Option<PathBuf>,
    pub kind: TrackKind,
}

impl Track {
    pub fn new(id: impl Into<String>, language: impl Into<String>, descriptor: Descriptor, kind: TrackKind) -> Self {
        Track {
            id: id.into(),
            source: String::new(),
            language: language.into(),
            original_language: false,
            descriptor,
            static_key: None,
            kid: None,
            pssh: None,
            encrypted: false,
            needs_proxy: true,
            needs_repack: false,
            extra: TrackExtra::None,
            location: None,
            kind,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, TrackKind::Audio(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, TrackKind::Text(_))
    }

    pub fn needs_drm(&self) -> bool {
        self.encrypted && self.static_key.is_none()
    }

    pub fn bitrate(&self) -> u64 {
        match &self.kind {
            TrackKind::Video(v) => v.bitrate,
            TrackKind::Audio(a) => a.bitrate,
            TrackKind::Text(_) | TrackKind::Menu(_) => 0,
        }
    }

    pub fn codec(&self) -> Option<&str> {
        match &self.kind {
            TrackKind::Video(v) => Some(&v.codec),
            TrackKind::Audio(a) => Some(&a.codec),
            TrackKind::Text(t) => Some(&t.codec),
            TrackKind::Menu(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, kind: TrackKind) -> Track {
        Track::new(id, "en", Descriptor::Hls { playlist_url: "https://example.test/a.m3u8".into() }, kind)
    }

    #[test]
    fn static_key_suppresses_drm_need() {
        let mut t = track("v1", TrackKind::Video(VideoTrack {
            codec: "hvc1".into(), width: 1920, height: 1080, bitrate: 4_000_000,
            fps: Some(23.976), hdr: HdrFormat::Hdr10, range_name: "HDR10".into(),
        }));
        t.encrypted = true;
        assert!(t.needs_drm());
        t.static_key = Some("00112233445566778899aabbccddeeff".into());
        assert!(!t.needs_drm());
    }

    #[test]
    fn sort_rank_orders_kinds() {
        assert!(TrackKind::Video(VideoTrack {
            codec: "avc1".into(), width: 0, height: 0, bitrate: 0, fps: None,
            hdr: HdrFormat::None, range_name: "SDR".into(),
        }).sort_rank() < TrackKind::Audio(AudioTrack {
            codec: "aac".into(), bitrate: 0, channels: None, descriptive: false, atmos: false,
        }).sort_rank());
    }

    #[test]
    fn needs_proxy_defaults_true_until_an_adapter_opts_a_track_out() {
        let mut t = track("v1", TrackKind::Video(VideoTrack {
            codec: "avc1".into(), width: 0, height: 0, bitrate: 0, fps: None,
            hdr: HdrFormat::None, range_name: "SDR".into(),
        }));
        assert!(t.needs_proxy);
        t.needs_proxy = false;
        assert!(!t.needs_proxy);
    }
}
