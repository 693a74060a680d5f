//! MPEG-DASH (MPD) manifest parsing.
//!
//! Struct shapes and the `$Number$`/`$Bandwidth$` template resolver are
//! grounded on the teacher's `lib.rs` (`MPD`/`Period`/`AdaptationSet`/
//! `Representation`/`SegmentTemplate`, `parse_xs_duration`,
//! `resolve_url_template`). `ContentProtection` is expanded well beyond the
//! teacher's version — `dash-mpd-rs` treats DRM as explicitly out of scope
//! and only keeps the `@robustness`/`@refId` attributes, whereas this crate
//! needs `schemeIdUri`, `cenc:default_KID` and the embedded `pssh` payload
//! to drive `DrmSession` (spec §4.1, §4.4).

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use serde::{de, Deserialize};

use crate::error::{Error, Result};
use crate::model::{Descriptor, Kid, Track, TrackKind, VideoTrack, AudioTrack, TextTrack, HdrFormat};

const WIDEVINE_SYSTEM_ID: &str = "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
const PLAYREADY_SYSTEM_ID: &str = "9a04f079-9840-4286-ab92-e65be0885f95";

#[derive(Debug, Deserialize, Clone)]
pub struct S {
    pub t: Option<i64>,
    pub d: i64,
    pub r: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmentTimeline {
    #[serde(rename = "S")]
    pub segments: Vec<S>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmentTemplate {
    pub initialization: Option<String>,
    pub media: Option<String>,
    pub SegmentTimeline: Option<SegmentTimeline>,
    pub startNumber: Option<u64>,
    pub duration: Option<u64>,
    pub timescale: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BaseURL {
    #[serde(rename = "$value")]
    pub base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentProtection {
    pub schemeIdUri: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "default_KID")]
    pub default_kid: Option<String>,
    /// Base64-encoded PSSH box payload, carried as the element's text
    /// content by every DRM system that embeds one in the MPD.
    #[serde(rename = "pssh")]
    pub pssh_b64: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Role {
    pub schemeIdUri: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Representation {
    pub id: Option<String>,
    pub mimeType: Option<String>,
    pub codecs: Option<String>,
    pub bandwidth: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub frameRate: Option<String>,
    pub BaseURL: Option<BaseURL>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "ContentProtection")]
    pub content_protections: Option<Vec<ContentProtection>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdaptationSet {
    pub id: Option<i64>,
    pub contentType: Option<String>,
    pub mimeType: Option<String>,
    pub lang: Option<String>,
    pub codecs: Option<String>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "ContentProtection")]
    pub content_protections: Option<Vec<ContentProtection>>,
    #[serde(rename = "Role")]
    pub roles: Option<Vec<Role>>,
    #[serde(rename = "Representation")]
    pub representations: Option<Vec<Representation>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Period {
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_xs_duration")]
    pub duration: Option<Duration>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "AdaptationSet")]
    pub adaptations: Option<Vec<AdaptationSet>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MPD {
    #[serde(rename = "type")]
    pub mpdtype: Option<String>,
    #[serde(rename = "Period")]
    pub periods: Vec<Period>,
    #[serde(rename = "BaseURL")]
    pub base_urls: Option<Vec<BaseURL>>,
}

fn parse_xs_duration(s: &str) -> Option<Duration> {
    match iso8601::duration(s).ok()? {
        iso8601::Duration::Weeks(w) => Some(Duration::new(w as u64 * 60 * 60 * 24 * 7, 0)),
        iso8601::Duration::YMDHMS { year, month, day, hour, minute, second, millisecond } => {
            let mut secs: u64 = second.into();
            secs += minute as u64 * 60;
            secs += hour as u64 * 60 * 60;
            secs += day as u64 * 60 * 60 * 24;
            secs += month as u64 * 60 * 60 * 24 * 31;
            secs += year as u64 * 60 * 60 * 24 * 31 * 365;
            Some(Duration::new(secs, millisecond * 1000))
        }
    }
}

fn deserialize_xs_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: de::Deserializer<'de>,
{
    match <Option<String>>::deserialize(deserializer) {
        Ok(Some(xs)) => Ok(parse_xs_duration(&xs)),
        Ok(None) => Ok(None),
        Err(_) => Ok(None),
    }
}

/// Substitute `$Number$`/`$Number%0Nd$`/`$Bandwidth$`/`$Time$` placeholders
/// in a `SegmentTemplate@media` (or `@initialization`) string.
pub fn resolve_url_template(template: &str, params: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for k in ["RepresentationID", "Number", "Time", "Bandwidth"] {
        let ident = format!("${k}$");
        if result.contains(&ident) {
            if let Some(value) = params.get(k) {
                result = result.replace(&ident, value);
            }
        }
        let re = Regex::new(&format!("\\${k}%0([\\d])d\\$")).unwrap();
        if let Some(cap) = re.captures(&result) {
            if let Some(value) = params.get(k) {
                let width: usize = cap[1].parse().unwrap_or(1);
                let padded = format!("{value:0>width$}");
                let m = re.find(&result).unwrap();
                result = format!("{}{}{}", &result[..m.start()], padded, &result[m.end()..]);
            }
        }
    }
    result
}

pub fn parse(xml: &str) -> Result<MPD> {
    quick_xml::de::from_str(xml).map_err(|e| Error::ManifestError(format!("parsing MPD: {e}")))
}

/// Parse the `cenc:default_KID` UUID form (`xxxxxxxx-xxxx-...`) into a
/// normalized `Kid`, reversing the little-endian byte order per RFC 4122.
fn kid_from_uuid_string(uuid: &str) -> Option<Kid> {
    let cleaned: String = uuid.chars().filter(|c| *c != '-').collect();
    if cleaned.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for i in 0..16 {
        bytes[i] = u8::from_str_radix(&cleaned[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(Kid::from_uuid_le(&bytes))
}

fn is_widevine_or_playready(scheme: &str) -> bool {
    let scheme = scheme.trim_start_matches("urn:uuid:").to_ascii_lowercase();
    scheme == WIDEVINE_SYSTEM_ID || scheme == PLAYREADY_SYSTEM_ID
}

/// Flatten every `AdaptationSet`/`Representation` pair in every `Period`
/// into the canonical `Track` model, resolving segment URLs via
/// `SegmentTemplate` and extracting KID/PSSH from `ContentProtection`
/// (spec §4.1, §4.4). Only `SegmentTemplate` addressing is implemented;
/// `SegmentBase`/`SegmentList` manifests are out of scope for this crate's
/// test fixtures but would extend this same function.
pub fn extract_tracks(mpd: &MPD, base_url: &str) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for (pidx, period) in mpd.periods.iter().enumerate() {
        let adaptations = period.adaptations.as_deref().unwrap_or(&[]);
        for aset in adaptations {
            let content_type = aset.contentType.as_deref()
                .or(aset.mimeType.as_deref())
                .unwrap_or("");
            let reps = aset.representations.as_deref().unwrap_or(&[]);
            for rep in reps {
                let tmpl = rep.SegmentTemplate.as_ref()
                    .or(aset.SegmentTemplate.as_ref())
                    .or(period.SegmentTemplate.as_ref());
                let rep_id = rep.id.clone().unwrap_or_default();
                let mut segment_urls = Vec::new();
                let mut init_url = None;
                if let Some(t) = tmpl {
                    let mut params = HashMap::new();
                    params.insert("RepresentationID", rep_id.clone());
                    if let Some(bw) = rep.bandwidth {
                        params.insert("Bandwidth", bw.to_string());
                    }
                    if let Some(init) = &t.initialization {
                        init_url = Some(format!("{base_url}{}", resolve_url_template(init, &params)));
                    }
                    if let Some(media) = &t.media {
                        if let Some(timeline) = &t.SegmentTimeline {
                            let mut number = t.startNumber.unwrap_or(1);
                            let mut time = 0i64;
                            for s in &timeline.segments {
                                if let Some(t0) = s.t { time = t0; }
                                let repeat = s.r.unwrap_or(0).max(0);
                                for _ in 0..=repeat {
                                    let mut p = params.clone();
                                    p.insert("Number", number.to_string());
                                    p.insert("Time", time.to_string());
                                    segment_urls.push(format!("{base_url}{}", resolve_url_template(media, &p)));
                                    number += 1;
                                    time += s.d;
                                }
                            }
                        } else {
                            // Indexed by $Number$ alone: caller resolves the segment
                            // count from the period duration; here we emit just the
                            // first segment URL as a template anchor.
                            let mut p = params.clone();
                            p.insert("Number", t.startNumber.unwrap_or(1).to_string());
                            segment_urls.push(format!("{base_url}{}", resolve_url_template(media, &p)));
                        }
                    }
                }
                let cps: Vec<&ContentProtection> = rep.content_protections.iter().flatten()
                    .chain(aset.content_protections.iter().flatten())
                    .collect();
                let encrypted = cps.iter().any(|cp| {
                    cp.schemeIdUri.as_deref().map(is_widevine_or_playready).unwrap_or(false)
                });
                let kid = cps.iter()
                    .find_map(|cp| cp.default_kid.as_deref())
                    .and_then(kid_from_uuid_string);
                let pssh = cps.iter()
                    .find_map(|cp| cp.pssh_b64.as_deref())
                    .and_then(|b64| {
                        use base64::Engine;
                        base64::engine::general_purpose::STANDARD.decode(b64).ok()
                    });

                let id = format!("p{pidx}-{rep_id}");
                let lang = aset.lang.clone().unwrap_or_else(|| "und".into());
                let descriptor = Descriptor::Dash { init_url, segment_urls };

                let kind = if content_type.starts_with("video") {
                    TrackKind::Video(VideoTrack {
                        codec: rep.codecs.clone().or_else(|| aset.codecs.clone()).unwrap_or_default(),
                        width: rep.width.unwrap_or(0) as u32,
                        height: rep.height.unwrap_or(0) as u32,
                        bitrate: rep.bandwidth.unwrap_or(0),
                        fps: rep.frameRate.as_deref().and_then(parse_frame_rate),
                        hdr: HdrFormat::None,
                        range_name: "SDR".into(),
                    })
                } else if content_type.starts_with("audio") {
                    TrackKind::Audio(AudioTrack {
                        codec: rep.codecs.clone().or_else(|| aset.codecs.clone()).unwrap_or_default(),
                        bitrate: rep.bandwidth.unwrap_or(0),
                        channels: None,
                        descriptive: aset.roles.iter().flatten()
                            .any(|r| r.value.as_deref() == Some("description")),
                        atmos: false,
                    })
                } else {
                    TrackKind::Text(TextTrack {
                        codec: rep.codecs.clone().unwrap_or_default(),
                        sdh: false,
                        forced: aset.roles.iter().flatten().any(|r| r.value.as_deref() == Some("forced-subtitle")),
                        closed_caption: false,
                    })
                };

                let mut track = Track::new(id, lang, descriptor, kind);
                track.encrypted = encrypted;
                track.kid = kid;
                track.pssh = pssh;
                tracks.push(track);
            }
        }
    }
    Ok(tracks)
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den != 0.0 { return Some(num / den); }
        None
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<MPD type="static">
      <Period>
        <AdaptationSet contentType="video" lang="en">
          <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
                              default_KID="00112233-4455-6677-8899-aabbccddeeff"/>
          <Representation id="v1" codecs="hvc1" bandwidth="4000000" width="1920" height="1080">
            <SegmentTemplate initialization="init-$RepresentationID$.mp4" media="seg-$RepresentationID$-$Number$.m4s" startNumber="1">
              <SegmentTimeline>
                <S t="0" d="4000" r="1"/>
              </SegmentTimeline>
            </SegmentTemplate>
          </Representation>
        </AdaptationSet>
      </Period>
    </MPD>"#;

    #[test]
    fn parses_segment_template_and_kid() {
        let mpd = parse(SAMPLE).unwrap();
        let tracks = extract_tracks(&mpd, "https://cdn.test/").unwrap();
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert!(t.encrypted);
        assert!(t.kid.is_some());
        match &t.descriptor {
            Descriptor::Dash { segment_urls, .. } => assert_eq!(segment_urls.len(), 2),
            _ => panic!("expected Dash descriptor"),
        }
    }

    #[test]
    fn template_resolves_number_and_bandwidth() {
        let mut params = HashMap::new();
        params.insert("Number", "7".to_string());
        params.insert("Bandwidth", "500000".to_string());
        assert_eq!(resolve_url_template("seg-$Number%05d$-$Bandwidth$.m4s", &params), "seg-00007-500000.m4s");
    }
}
