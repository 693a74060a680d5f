//! Smooth Streaming (`.ism`/`.isml`) manifest parsing.
//!
//! Struct shapes and the WRMHEADER PlayReady blob decode are ported from
//! `original_source/vinetrimmer/parsers/ism.py`, which this crate's
//! `manifest::ism` is the direct Rust counterpart of. FourCC-to-codec
//! mapping and the multiple WRMHEADER schema versions (4.0.0.0/4.1.0.0/
//! 4.3.0.0) are carried over unchanged in meaning; XML layout and variable
//! names are not translated verbatim (see `SPEC_FULL.md`).

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Descriptor, Kid, Track, TrackExtra, TrackKind, VideoTrack, AudioTrack, TextTrack, HdrFormat};

#[derive(Debug, Deserialize, Clone)]
pub struct QualityLevel {
    pub Index: Option<u32>,
    pub Bitrate: u64,
    pub FourCC: Option<String>,
    pub MaxWidth: Option<u32>,
    pub MaxHeight: Option<u32>,
    pub SamplingRate: Option<u32>,
    pub Channels: Option<u32>,
    pub CodecPrivateData: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chunk {
    pub n: Option<u64>,
    pub d: Option<u64>,
    pub t: Option<u64>,
    pub r: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamIndex {
    #[serde(rename = "Type")]
    pub stream_type: String,
    pub Name: Option<String>,
    pub Language: Option<String>,
    pub Url: String,
    #[serde(rename = "QualityLevel")]
    pub quality_levels: Vec<QualityLevel>,
    #[serde(rename = "c", default)]
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProtectionHeader {
    pub SystemID: Option<String>,
    #[serde(rename = "$value")]
    pub content: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Protection {
    pub ProtectionHeader: ProtectionHeader,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothStreamingMedia {
    pub Duration: Option<u64>,
    pub TimeScale: Option<u64>,
    #[serde(rename = "StreamIndex")]
    pub stream_indexes: Vec<StreamIndex>,
    pub Protection: Option<Protection>,
}

pub fn parse(xml: &str) -> Result<SmoothStreamingMedia> {
    quick_xml::de::from_str(xml).map_err(|e| Error::ManifestError(format!("parsing ISM manifest: {e}")))
}

/// Map a Smooth Streaming FourCC to the codec tag used elsewhere in the
/// track model. Unknown FourCCs are passed through lowercase, matching the
/// original's lenient behaviour rather than raising.
fn fourcc_to_codec(fourcc: &str) -> String {
    match fourcc.to_ascii_uppercase().as_str() {
        "H264" | "AVC1" => "avc1".into(),
        "HVC1" | "HEVC" => "hvc1".into(),
        "AACL" => "mp4a".into(),
        "EC-3" | "EC3" => "ec-3".into(),
        "TTML" => "ttml".into(),
        other => other.to_ascii_lowercase(),
    }
}

/// A decoded PlayReady WRMHEADER: key id and license-acquisition URL.
#[derive(Debug, Clone)]
pub struct WrmHeader {
    pub kid: Option<Kid>,
    pub la_url: Option<String>,
}

/// Decode a PlayReady Header Object (the base64 content of a Smooth
/// Streaming `<ProtectionHeader>`): a 10-byte preamble (length + record
/// count) followed by `(type: u16, length: u16, data)` records, one of
/// which (type 1) is a UTF-16LE WRMHEADER XML document. The KID's location
/// in that document depends on the WRMHEADER schema version (spec §4.1):
/// 4.0.0.0 and 4.1.0.0 carry it as the text of a `<KID>` element (base64,
/// little-endian 16 bytes); 4.3.0.0 moves it to a `VALUE` attribute on a
/// `<KID ALGID="AESCBC" VALUE="...">` element nested under `<KIDS>`, which a
/// plain element-text search would silently miss.
pub fn decode_wrmheader(protection_header_b64: &str) -> Result<WrmHeader> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(protection_header_b64)
        .map_err(|e| Error::ManifestError(format!("decoding ProtectionHeader base64: {e}")))?;
    if bytes.len() < 10 {
        return Err(Error::ManifestError("PlayReady header object too short".into()));
    }
    let record_count = u16::from_le_bytes([bytes[8], bytes[9]]);
    let mut offset = 10usize;
    let mut wrm_xml_utf16le: Option<Vec<u8>> = None;
    for _ in 0..record_count {
        if offset + 4 > bytes.len() { break; }
        let record_type = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let record_len = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
        offset += 4;
        if offset + record_len > bytes.len() { break; }
        if record_type == 1 {
            wrm_xml_utf16le = Some(bytes[offset..offset + record_len].to_vec());
        }
        offset += record_len;
    }
    let Some(utf16le) = wrm_xml_utf16le else {
        return Err(Error::ManifestError("no WRMHEADER record in PlayReady header object".into()));
    };
    let units: Vec<u16> = utf16le.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    let xml = String::from_utf16_lossy(&units);
    let kid_b64 = wrmheader_version(&xml)
        .map(|v| v == "4.3.0.0")
        .unwrap_or(false)
        .then(|| extract_xml_attr(&xml, "KID", "VALUE"))
        .flatten()
        .or_else(|| extract_xml_element(&xml, "KID"));
    let kid = kid_b64.and_then(|b64| {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(b64).ok()
    }).and_then(|raw| {
        if raw.len() == 16 {
            let mut arr = [0u8; 16];
            arr.copy_from_slice(&raw);
            Some(Kid::from_uuid_le(&arr))
        } else {
            None
        }
    });
    let la_url = extract_xml_element(&xml, "LA_URL");
    Ok(WrmHeader { kid, la_url })
}

/// The WRMHEADER's declared schema version, e.g. `"4.3.0.0"`.
fn wrmheader_version(xml: &str) -> Option<String> {
    extract_xml_attr(xml, "WRMHEADER", "version")
}

fn extract_xml_element(xml: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

/// Find the first `<{tag} ...>` opening tag and return the value of
/// `attr="..."` within it, if present.
fn extract_xml_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{tag}");
    let tag_start = xml.find(&open)?;
    let tag_end = xml[tag_start..].find('>')? + tag_start;
    let tag_text = &xml[tag_start..tag_end];
    let needle = format!("{attr}=\"");
    let attr_start = tag_text.find(&needle)? + needle.len();
    let attr_end = tag_text[attr_start..].find('"')? + attr_start;
    Some(tag_text[attr_start..attr_end].to_string())
}

/// Walk a StreamIndex's run-length-encoded chunk list (`n`/`d`/`t`/`r`) into
/// a flat list of fragment start times: `t` resets the running clock when
/// present, `d` is the duration of the chunk (repeated `r+1` times when `r`
/// is present), and each repeat's start time is the previous one plus `d`.
fn expand_start_times(chunks: &[Chunk]) -> Vec<u64> {
    let mut times = Vec::new();
    let mut current: u64 = 0;
    for chunk in chunks {
        if let Some(t) = chunk.t {
            current = t;
        }
        let d = chunk.d.unwrap_or(0);
        let repeats = chunk.r.unwrap_or(0) + 1;
        for _ in 0..repeats {
            times.push(current);
            current += d;
        }
    }
    times
}

pub fn extract_tracks(ism: &SmoothStreamingMedia, base_url: &str) -> Vec<Track> {
    let mut tracks = Vec::new();
    let protection = ism.Protection.as_ref()
        .and_then(|p| decode_wrmheader(&p.ProtectionHeader.content).ok());
    for si in &ism.stream_indexes {
        let start_times = expand_start_times(&si.chunks);
        for ql in &si.quality_levels {
            let id = format!("{}-{}", si.stream_type, ql.Index.unwrap_or(0));
            let lang = si.Language.clone().unwrap_or_else(|| "und".into());
            let template = format!("{base_url}{}", si.Url);
            let descriptor = Descriptor::Ism {
                template,
                bitrate: ql.Bitrate,
                start_times: start_times.clone(),
            };
            let codec = ql.FourCC.as_deref().map(fourcc_to_codec).unwrap_or_default();
            let kind = match si.stream_type.as_str() {
                "video" => TrackKind::Video(VideoTrack {
                    codec,
                    width: ql.MaxWidth.unwrap_or(0),
                    height: ql.MaxHeight.unwrap_or(0),
                    bitrate: ql.Bitrate,
                    fps: None,
                    hdr: HdrFormat::None,
                    range_name: "SDR".into(),
                }),
                "audio" => TrackKind::Audio(AudioTrack {
                    codec,
                    bitrate: ql.Bitrate,
                    channels: ql.Channels.map(|c| c as f32),
                    descriptive: false,
                    atmos: ql.FourCC.as_deref().map(|f| f.eq_ignore_ascii_case("EC-3")).unwrap_or(false),
                }),
                _ => TrackKind::Text(TextTrack { codec, sdh: false, forced: false, closed_caption: false }),
            };
            let mut track = Track::new(id, lang, descriptor, kind);
            track.extra = TrackExtra::IsmQualityLevel {
                stream_index: si.Name.clone().unwrap_or_else(|| si.stream_type.clone()),
                quality_level: ql.Index.unwrap_or(0).to_string(),
            };
            if let Some(p) = &protection {
                track.encrypted = true;
                track.kid = p.kid.clone();
            }
            tracks.push(track);
        }
    }
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_maps_known_codecs() {
        assert_eq!(fourcc_to_codec("H264"), "avc1");
        assert_eq!(fourcc_to_codec("AACL"), "mp4a");
        assert_eq!(fourcc_to_codec("unknownfourcc"), "unknownfourcc");
    }

    #[test]
    fn extract_xml_element_finds_inner_text() {
        let xml = "<WRMHEADER><DATA><KID>AAECAwQFBgcICQoLDA0ODw==</KID></DATA></WRMHEADER>";
        assert_eq!(extract_xml_element(xml, "KID").as_deref(), Some("AAECAwQFBgcICQoLDA0ODw=="));
    }

    #[test]
    fn extract_xml_attr_finds_value_attribute() {
        let xml = r#"<WRMHEADER version="4.3.0.0"><DATA><PROTECTINFO><KIDS><KID ALGID="AESCBC" VALUE="AAECAwQFBgcICQoLDA0ODw==" CHECKSUM="abcd"></KID></KIDS></PROTECTINFO></DATA></WRMHEADER>"#;
        assert_eq!(wrmheader_version(xml).as_deref(), Some("4.3.0.0"));
        assert_eq!(extract_xml_attr(xml, "KID", "VALUE").as_deref(), Some("AAECAwQFBgcICQoLDA0ODw=="));
    }

    #[test]
    fn expand_start_times_applies_repeat_counts() {
        let chunks = vec![
            Chunk { n: Some(0), d: Some(1000), t: Some(0), r: Some(2) },
            Chunk { n: Some(3), d: Some(500), t: None, r: None },
        ];
        assert_eq!(expand_start_times(&chunks), vec![0, 1000, 2000, 3000]);
    }
}
