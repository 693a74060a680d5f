//! Selection and ordering over a title's tracks.
//!
//! `vinetrimmer`'s `Tracks.select_videos`/`select_audios` raise
//! `errors.NoAltCodec`/return silently depending on context, which downstream
//! callers distinguish by catching exceptions. The REDESIGN FLAGS in
//! `SPEC_FULL.md` replace that with an explicit outcome type: callers match
//! on `Select` rather than on exception class. `select_videos` is the one
//! exception — spec §4.2 says it "raises NoMatchingTrack" rather than
//! returning an empty `Select`, so it returns a `Result` instead.
use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::track::{HdrFormat, Track, TrackKind};

#[derive(Debug)]
pub enum Select<'a> {
    /// At least one track matched.
    Found(Vec<&'a Track>),
    /// The filter matched nothing, but the caller asked to fall back
    /// (`fallback: true`) and the unfiltered set was returned instead.
    Empty(Vec<&'a Track>),
    /// Filtering by original-language audio found no candidate at all —
    /// distinguished from `Empty` because callers usually treat the
    /// absence of *any* original-language track as a harder failure
    /// (`Error::NoOriginalLanguage`) than an empty codec/channel filter.
    NoOriginal,
}

/// A bitrate bound for `select_videos`/`select_audios`: either a ceiling, or
/// the literal `"min"` request that picks the lowest-bitrate survivor
/// instead of capping from above (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub enum Vbitrate {
    Max(u64),
    Min,
}

#[derive(Default)]
pub struct TrackSet {
    tracks: Vec<Track>,
}

impl TrackSet {
    pub fn new() -> Self {
        TrackSet { tracks: Vec::new() }
    }

    /// Derive a stable track id from content that doesn't change across
    /// re-runs (service, title id, language, descriptor discriminant,
    /// bitrate) so that vault lookups and resume markers survive a
    /// manifest being re-fetched.
    pub fn stable_id(service: &str, title_id: &str, language: &str, distinguisher: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(service.as_bytes());
        hasher.update(b"\0");
        hasher.update(title_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(language.as_bytes());
        hasher.update(b"\0");
        hasher.update(distinguisher.as_bytes());
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }

    /// Insert a track, never silently overwriting an existing id (spec
    /// §4.2). On a duplicate id, `warn_only` decides whether the insert is
    /// just dropped with a log line or rejected outright.
    pub fn add(&mut self, track: Track, warn_only: bool) -> Result<()> {
        if self.by_id(&track.id).is_some() {
            if warn_only {
                warn!("dropping track {} with duplicate id", track.id);
                return Ok(());
            }
            return Err(Error::Other(format!("duplicate track id {}", track.id)));
        }
        self.tracks.push(track);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn by_id(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn by_id_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn videos(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_video()).collect()
    }

    pub fn audios(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_audio()).collect()
    }

    pub fn texts(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_text()).collect()
    }

    /// Descending bitrate, then language partitioning (spec §4.2).
    pub fn sort_videos(&mut self, by_language: Option<&[String]>) {
        self.sort_group(Track::is_video, |a, b| b.bitrate().cmp(&a.bitrate()), by_language);
    }

    /// Descending bitrate, descending channel count, non-descriptive before
    /// descriptive, then language partitioning (spec §4.2).
    pub fn sort_audios(&mut self, by_language: Option<&[String]>) {
        self.sort_group(Track::is_audio, |a, b| {
            b.bitrate().cmp(&a.bitrate())
                .then_with(|| channel_count(b).partial_cmp(&channel_count(a)).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| is_descriptive(a).cmp(&is_descriptive(b)))
        }, by_language);
    }

    /// Ascending language, forced tracks floated to the top, then language
    /// partitioning last (spec §4.2).
    pub fn sort_subtitles(&mut self, by_language: Option<&[String]>) {
        self.sort_group(Track::is_text, |a, b| {
            is_forced(b).cmp(&is_forced(a)).then_with(|| a.language.cmp(&b.language))
        }, by_language);
    }

    fn sort_group(
        &mut self,
        pred: impl Fn(&Track) -> bool,
        cmp: impl Fn(&Track, &Track) -> std::cmp::Ordering,
        by_language: Option<&[String]>,
    ) {
        let idxs: Vec<usize> = self.tracks.iter().enumerate().filter(|(_, t)| pred(t)).map(|(i, _)| i).collect();
        let mut group: Vec<Track> = idxs.iter().map(|&i| self.tracks[i].clone()).collect();
        group.sort_by(|a, b| cmp(a, b));
        apply_language_partition(&mut group, by_language);
        for (slot, track) in idxs.into_iter().zip(group.into_iter()) {
            self.tracks[slot] = track;
        }
    }

    /// Select video tracks by target height (with the documented 1248x520
    /// "SD tier" carve-out), then bitrate, range, and codec filters, in
    /// that order (spec §4.2). Raises `NoMatchingTrack` rather than
    /// returning an empty set, since video is almost always mandatory.
    pub fn select_videos(
        &self,
        by_quality: Option<u32>,
        by_vbitrate: Option<Vbitrate>,
        by_range: Option<HdrFormat>,
        by_codec: Option<&str>,
        one_only: bool,
    ) -> Result<Vec<&Track>> {
        let mut candidates = self.videos();
        if candidates.is_empty() {
            return Err(Error::NoMatchingTrack);
        }
        if let Some(target) = by_quality {
            let target_height = if target == 1248 { 520 } else { target };
            let nearest_height = candidates.iter()
                .filter_map(|t| match &t.kind { TrackKind::Video(v) => Some(v.height), _ => None })
                .min_by_key(|h| (*h as i64 - target_height as i64).abs());
            if let Some(nearest_height) = nearest_height {
                candidates.retain(|t| matches!(&t.kind, TrackKind::Video(v) if v.height == nearest_height));
            }
        }
        if candidates.is_empty() {
            return Err(Error::NoMatchingTrack);
        }
        if let Some(vb) = by_vbitrate {
            candidates = filter_by_vbitrate(candidates, vb);
        }
        if candidates.is_empty() {
            return Err(Error::NoMatchingTrack);
        }
        if let Some(range) = by_range {
            candidates.retain(|t| matches!(&t.kind, TrackKind::Video(v) if v.hdr == range));
        }
        if candidates.is_empty() {
            return Err(Error::NoMatchingTrack);
        }
        if let Some(codec) = by_codec {
            let codec = codec.to_ascii_lowercase();
            candidates.retain(|t| matches!(&t.kind, TrackKind::Video(v) if v.codec.to_ascii_lowercase().contains(&codec)));
        }
        if candidates.is_empty() {
            return Err(Error::NoMatchingTrack);
        }
        if one_only {
            candidates.truncate(1);
        }
        Ok(candidates)
    }

    /// Keep the best-bitrate survivor per requested range (spec §4.8's
    /// HDR-hybrid selection keeps one HDR10 and one Dolby Vision track),
    /// deduped by `(width, height, codec)` so the same representation
    /// can't be selected twice under two different range requests.
    pub fn select_videos_multi(&self, ranges: &[HdrFormat]) -> Select<'_> {
        let mut seen: HashSet<(u32, u32, String)> = HashSet::new();
        let mut out: Vec<&Track> = Vec::new();
        for range in ranges {
            let mut candidates: Vec<&Track> = self.videos().into_iter()
                .filter(|t| matches!(&t.kind, TrackKind::Video(v) if v.hdr == *range))
                .collect();
            candidates.sort_by(|a, b| b.bitrate().cmp(&a.bitrate()));
            for t in candidates {
                if let TrackKind::Video(v) = &t.kind {
                    if seen.insert((v.width, v.height, v.codec.clone())) {
                        out.push(t);
                        break;
                    }
                }
            }
        }
        if out.is_empty() { Select::Empty(Vec::new()) } else { Select::Found(out) }
    }

    /// Select audio tracks. `by_codec`/`by_channels` accept comma-separated
    /// lists (`"AAC,EC3"`); when `max_audio_compatibility` is set, the
    /// Cartesian product of those lists is evaluated and the best-bitrate
    /// survivor per `(codec, channels)` cell is kept, so a request for two
    /// codecs and two channel layouts yields up to four tracks (spec §8
    /// boundary case). Language selection always runs last.
    pub fn select_audios(
        &self,
        by_language: Option<&[String]>,
        by_bitrate: Option<Vbitrate>,
        by_channels: Option<&str>,
        by_codec: Option<&str>,
        with_descriptive: bool,
        max_audio_compatibility: bool,
        with_atmos: bool,
    ) -> Select<'_> {
        let mut pool = self.audios();
        if !with_descriptive {
            pool.retain(|t| !matches!(&t.kind, TrackKind::Audio(a) if a.descriptive));
        }
        if with_atmos {
            let atmos: Vec<&Track> = pool.iter().copied()
                .filter(|t| matches!(&t.kind, TrackKind::Audio(a) if a.atmos))
                .collect();
            if !atmos.is_empty() {
                pool = atmos;
            }
        }

        if max_audio_compatibility {
            let codecs = by_codec.map(parse_comma_list).unwrap_or_default();
            let channels = by_channels.map(parse_comma_list).unwrap_or_default();
            if codecs.is_empty() || channels.is_empty() {
                return Select::Empty(Vec::new());
            }
            let mut out: Vec<&Track> = Vec::new();
            for codec in &codecs {
                for chans in &channels {
                    let mut cell: Vec<&Track> = pool.iter().copied()
                        .filter(|t| matches!(&t.kind, TrackKind::Audio(a)
                            if a.codec.eq_ignore_ascii_case(codec) && channels_match(a.channels, chans)))
                        .collect();
                    cell.sort_by(|a, b| b.bitrate().cmp(&a.bitrate()));
                    if let Some(best) = cell.into_iter().next() {
                        out.push(best);
                    }
                }
            }
            if out.is_empty() {
                return Select::Empty(Vec::new());
            }
            return finish_with_language(by_language, out, false);
        }

        if let Some(codec_list) = by_codec {
            let codecs = parse_comma_list(codec_list);
            pool.retain(|t| matches!(&t.kind, TrackKind::Audio(a) if codecs.iter().any(|c| a.codec.eq_ignore_ascii_case(c))));
        }
        if let Some(channel_list) = by_channels {
            let chans = parse_comma_list(channel_list);
            pool.retain(|t| matches!(&t.kind, TrackKind::Audio(a) if chans.iter().any(|c| channels_match(a.channels, c))));
        }
        if let Some(vb) = by_bitrate {
            pool = filter_by_vbitrate(pool, vb);
        }
        if pool.is_empty() {
            return Select::Empty(Vec::new());
        }

        let one_per_lang = !(multi_valued(by_codec) || multi_valued(by_channels));
        finish_with_language(by_language, pool, one_per_lang)
    }

    /// Select subtitle tracks. `forced_scope_langs` limits forced-track
    /// retention to subtitles whose language matches an already-selected
    /// audio language (spec §4.2).
    pub fn select_subtitles(
        &self,
        by_language: Option<&[String]>,
        with_cc: bool,
        with_sdh: bool,
        with_forced: bool,
        forced_scope_langs: &[String],
    ) -> Select<'_> {
        let mut pool = self.texts();
        if !with_cc {
            pool.retain(|t| !matches!(&t.kind, TrackKind::Text(tt) if tt.closed_caption));
        }
        if !with_sdh {
            pool.retain(|t| !matches!(&t.kind, TrackKind::Text(tt) if tt.sdh));
        }
        if !with_forced {
            pool.retain(|t| !matches!(&t.kind, TrackKind::Text(tt) if tt.forced));
        } else if !forced_scope_langs.is_empty() {
            pool.retain(|t| {
                let forced = matches!(&t.kind, TrackKind::Text(tt) if tt.forced);
                if !forced {
                    return true;
                }
                forced_scope_langs.iter().any(|l| bcp47_primary(l).eq_ignore_ascii_case(bcp47_primary(&t.language)))
            });
        }
        if pool.is_empty() {
            return Select::Empty(Vec::new());
        }
        finish_with_language(by_language, pool, false)
    }

    /// Shared language filter behind every `select_*` above. `"all"`
    /// disables filtering; `"orig"` keeps only the original-language
    /// track(s), raising `NoOriginal` when more than one language is
    /// present and none is marked original. Otherwise `langs` is matched
    /// by BCP-47 primary subtag against each track's language.
    pub fn select_by_language<'t>(langs: &[String], tracks: Vec<&'t Track>, one_per_lang: bool) -> Select<'t> {
        if tracks.is_empty() {
            return Select::Empty(Vec::new());
        }
        if langs.iter().any(|l| l.eq_ignore_ascii_case("all")) {
            return Select::Found(tracks);
        }
        if langs.iter().any(|l| l.eq_ignore_ascii_case("orig")) {
            let originals: Vec<&Track> = tracks.iter().copied().filter(|t| t.original_language).collect();
            if !originals.is_empty() {
                return Select::Found(originals);
            }
            let distinct: HashSet<&str> = tracks.iter().map(|t| t.language.as_str()).collect();
            return if distinct.len() > 1 { Select::NoOriginal } else { Select::Found(tracks) };
        }
        let mut matched: Vec<&Track> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for lang in langs {
            let primary = bcp47_primary(lang).to_ascii_lowercase();
            for t in tracks.iter().copied() {
                if bcp47_primary(&t.language).eq_ignore_ascii_case(&primary) {
                    if one_per_lang && !seen.insert(bcp47_primary(&t.language).to_ascii_lowercase()) {
                        continue;
                    }
                    matched.push(t);
                }
            }
        }
        if matched.is_empty() { Select::Empty(Vec::new()) } else { Select::Found(matched) }
    }

    /// Order tracks for muxing: video, then audio, then text, then menu;
    /// within a kind, the service's declared original-language track first,
    /// then descending bitrate. No service name is ever referenced here —
    /// a service that needs a different order supplies an ordering hint
    /// through `ServiceAdapter` instead of being special-cased (DESIGN.md
    /// Open Question 4).
    pub fn sort_for_mux(&mut self) {
        self.tracks.sort_by(|a, b| {
            a.kind.sort_rank().cmp(&b.kind.sort_rank())
                .then(b.original_language.cmp(&a.original_language))
                .then(b.bitrate().cmp(&a.bitrate()))
        });
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        if s.len() >= chars { break; }
        s.push_str(&format!("{:02x}", b));
    }
    s.truncate(chars);
    s
}

fn channel_count(t: &Track) -> f32 {
    match &t.kind {
        TrackKind::Audio(a) => a.channels.unwrap_or(0.0),
        _ => 0.0,
    }
}

fn is_descriptive(t: &Track) -> bool {
    matches!(&t.kind, TrackKind::Audio(a) if a.descriptive)
}

fn is_forced(t: &Track) -> bool {
    matches!(&t.kind, TrackKind::Text(tt) if tt.forced)
}

/// BCP-47 primary subtag: the part before the first `-`/`_`.
pub fn bcp47_primary(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or(lang)
}

fn parse_comma_list(s: &str) -> Vec<String> {
    s.split(',').map(|x| x.trim().to_string()).filter(|x| !x.is_empty()).collect()
}

fn multi_valued(s: Option<&str>) -> bool {
    s.map(|s| parse_comma_list(s).len() > 1).unwrap_or(false)
}

/// Compare a parsed channel count against a `"N.M"` spec string (e.g.
/// `"5.1"`) within a small epsilon, since channel counts are stored as the
/// `front + 0.1*lfe` float convention used throughout the track model.
fn channels_match(channels: Option<f32>, spec: &str) -> bool {
    let Ok(spec): std::result::Result<f32, _> = spec.trim().parse() else { return false };
    match channels {
        Some(c) => (c - spec).abs() < 0.05,
        None => false,
    }
}

fn filter_by_vbitrate<'t>(tracks: Vec<&'t Track>, vb: Vbitrate) -> Vec<&'t Track> {
    match vb {
        Vbitrate::Min => {
            let Some(min) = tracks.iter().map(|t| t.bitrate()).min() else { return tracks };
            tracks.into_iter().filter(|t| t.bitrate() == min).collect()
        }
        Vbitrate::Max(cap) => tracks.into_iter().filter(|t| t.bitrate() <= cap).collect(),
    }
}

fn finish_with_language<'t>(by_language: Option<&[String]>, pool: Vec<&'t Track>, one_per_lang: bool) -> Select<'t> {
    match by_language {
        Some(langs) if !langs.is_empty() => TrackSet::select_by_language(langs, pool, one_per_lang),
        _ => Select::Found(pool),
    }
}

/// Apply `by_language` partitioning to an already-sorted group, in reverse
/// order so the first-listed language ends up as the outermost (highest
/// priority) partition, per spec §4.2's "applied in reverse" wording.
fn apply_language_partition(group: &mut [Track], by_language: Option<&[String]>) {
    let Some(langs) = by_language else { return };
    for lang in langs.iter().rev() {
        if lang.eq_ignore_ascii_case("all") {
            continue;
        }
        if lang.eq_ignore_ascii_case("orig") {
            group.sort_by_key(|t| if t.original_language { 0 } else { 1 });
            continue;
        }
        let primary = bcp47_primary(lang).to_ascii_lowercase();
        group.sort_by_key(|t| if bcp47_primary(&t.language).eq_ignore_ascii_case(&primary) { 0 } else { 1 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::{AudioTrack, Descriptor, VideoTrack, HdrFormat};

    fn video(id: &str, height: u32, bitrate: u64) -> Track {
        Track::new(id, "en", Descriptor::Hls { playlist_url: "u".into() }, TrackKind::Video(VideoTrack {
            codec: "hvc1".into(), width: height * 16 / 9, height, bitrate, fps: None,
            hdr: HdrFormat::None, range_name: "SDR".into(),
        }))
    }

    fn video_range(id: &str, height: u32, bitrate: u64, hdr: HdrFormat) -> Track {
        let mut t = video(id, height, bitrate);
        if let TrackKind::Video(v) = &mut t.kind { v.hdr = hdr; }
        t
    }

    fn audio(id: &str, lang: &str, codec: &str, channels: f32, bitrate: u64) -> Track {
        Track::new(id, lang, Descriptor::Hls { playlist_url: "u".into() }, TrackKind::Audio(AudioTrack {
            codec: codec.into(), bitrate, channels: Some(channels), descriptive: false, atmos: false,
        }))
    }

    #[test]
    fn select_videos_respects_height_cap() {
        let mut ts = TrackSet::new();
        ts.add(video("v1080", 1080, 8_000_000), true).unwrap();
        ts.add(video("v720", 720, 4_000_000), true).unwrap();
        let found = ts.select_videos(Some(720), None, None, None, false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "v720");
    }

    #[test]
    fn select_videos_raises_no_matching_track_when_range_absent() {
        let mut ts = TrackSet::new();
        ts.add(video("v1080", 1080, 8_000_000), true).unwrap();
        let err = ts.select_videos(None, None, Some(HdrFormat::DolbyVision), None, false).unwrap_err();
        assert!(matches!(err, Error::NoMatchingTrack));
    }

    #[test]
    fn select_videos_multi_keeps_one_per_range() {
        let mut ts = TrackSet::new();
        ts.add(video_range("hdr10", 2160, 8_000_000, HdrFormat::Hdr10), true).unwrap();
        ts.add(video_range("dv", 2160, 8_500_000, HdrFormat::DolbyVision), true).unwrap();
        match ts.select_videos_multi(&[HdrFormat::Hdr10, HdrFormat::DolbyVision]) {
            Select::Found(tracks) => assert_eq!(tracks.len(), 2),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn select_audios_max_compatibility_returns_one_per_cell() {
        let mut ts = TrackSet::new();
        ts.add(audio("a1", "en", "AAC", 2.0, 128_000), true).unwrap();
        ts.add(audio("a2", "en", "AAC", 5.1, 384_000), true).unwrap();
        ts.add(audio("a3", "en", "EC3", 2.0, 192_000), true).unwrap();
        ts.add(audio("a4", "en", "EC3", 5.1, 640_000), true).unwrap();
        match ts.select_audios(Some(&[String::from("all")]), None, Some("2.0,5.1"), Some("AAC,EC3"), false, true, false) {
            Select::Found(tracks) => assert_eq!(tracks.len(), 4),
            other => panic!("expected Found with 4 tracks, got {other:?}"),
        }
    }

    #[test]
    fn select_audios_falls_back_to_empty_when_codec_absent() {
        let mut ts = TrackSet::new();
        ts.add(audio("a1", "en", "aac", 2.0, 128_000), true).unwrap();
        match ts.select_audios(Some(&[String::from("en")]), None, None, Some("ec-3"), false, false, false) {
            Select::Empty(tracks) => assert!(tracks.is_empty()),
            other => panic!("expected Empty, got {other:?}"),
        }
    }

    #[test]
    fn select_by_language_no_original_when_languages_diverge_and_none_marked_original() {
        let mut ts = TrackSet::new();
        ts.add(audio("a1", "en", "aac", 2.0, 128_000), true).unwrap();
        ts.add(audio("a2", "fr", "aac", 2.0, 128_000), true).unwrap();
        match ts.select_audios(Some(&[String::from("orig")]), None, None, None, false, false, false) {
            Select::NoOriginal => {}
            other => panic!("expected NoOriginal, got {other:?}"),
        }
    }

    #[test]
    fn add_rejects_duplicate_id_unless_warn_only() {
        let mut ts = TrackSet::new();
        ts.add(audio("a1", "en", "aac", 2.0, 128_000), true).unwrap();
        ts.add(audio("a1", "fr", "aac", 2.0, 128_000), true).unwrap();
        assert_eq!(ts.audios().len(), 1);
        assert_eq!(ts.audios()[0].language, "en");

        let mut strict = TrackSet::new();
        strict.add(audio("a1", "en", "aac", 2.0, 128_000), false).unwrap();
        assert!(strict.add(audio("a1", "fr", "aac", 2.0, 128_000), false).is_err());
    }

    #[test]
    fn stable_id_is_deterministic() {
        let a = TrackSet::stable_id("svc", "title1", "en", "video:1080");
        let b = TrackSet::stable_id("svc", "title1", "en", "video:1080");
        assert_eq!(a, b);
        let c = TrackSet::stable_id("svc", "title1", "en", "video:720");
        assert_ne!(a, c);
    }
}
