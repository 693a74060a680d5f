//! Manifest ingestion across the three adaptive-streaming families this
//! crate understands: MPEG-DASH, HLS and Smooth Streaming (spec §4.1).

pub mod dash;
pub mod hls;
pub mod ism;
pub mod pssh;

use crate::error::Result;
use crate::model::Track;

/// Which manifest family a title's tracks were parsed from — carried
/// alongside the flattened `Track` list so that `download` and `decrypt`
/// know which per-family quirks apply (HLS discontinuity spans, ISM
/// template expansion, DASH SegmentTimeline accounting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Dash,
    Hls,
    Ism,
}

/// Parse a manifest already fetched as bytes, dispatching on a sniffed
/// content type rather than the URL extension, since many services serve
/// manifests from extensionless endpoints.
pub fn parse_and_extract(kind: ManifestKind, body: &str, base_url: &str) -> Result<Vec<Track>> {
    match kind {
        ManifestKind::Dash => {
            let mpd = dash::parse(body)?;
            dash::extract_tracks(&mpd, base_url)
        }
        ManifestKind::Hls => {
            let master = hls::parse_master(body.as_bytes())?;
            Ok(hls::extract_tracks(&master, base_url))
        }
        ManifestKind::Ism => {
            let ism = ism::parse(body)?;
            Ok(ism::extract_tracks(&ism, base_url))
        }
    }
}
