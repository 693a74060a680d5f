//! A single acquirable title: one or more periods/episodes worth of tracks.

use crate::model::trackset::TrackSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleKind {
    Movie,
    Tv,
}

#[derive(Debug, Clone)]
pub struct Title {
    pub service: String,
    pub title_id: String,
    pub name: String,
    pub kind: TitleKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub episode_name: Option<String>,
    pub year: Option<u32>,
    pub original_lang: Option<String>,
    /// Opaque per-service metadata threaded through from the adapter,
    /// untouched by anything in the core (spec §3).
    pub service_data: Option<serde_json::Value>,
}

impl Title {
    /// A movie title: never carries a season or episode (spec §3 invariant).
    pub fn new(service: impl Into<String>, title_id: impl Into<String>, name: impl Into<String>) -> Self {
        Title::movie(service, title_id, name)
    }

    pub fn movie(service: impl Into<String>, title_id: impl Into<String>, name: impl Into<String>) -> Self {
        Title {
            service: service.into(),
            title_id: title_id.into(),
            name: name.into(),
            kind: TitleKind::Movie,
            season: None,
            episode: None,
            episode_name: None,
            year: None,
            original_lang: None,
            service_data: None,
        }
    }

    /// A TV title: always carries both a season and an episode number
    /// (spec §3 invariant — the opposite half of the movie constructor's).
    pub fn tv(
        service: impl Into<String>,
        title_id: impl Into<String>,
        name: impl Into<String>,
        season: u32,
        episode: u32,
    ) -> Self {
        Title {
            service: service.into(),
            title_id: title_id.into(),
            name: name.into(),
            kind: TitleKind::Tv,
            season: Some(season),
            episode: Some(episode),
            episode_name: None,
            year: None,
            original_lang: None,
            service_data: None,
        }
    }

    pub fn is_tv(&self) -> bool {
        self.kind == TitleKind::Tv
    }

    /// Filename-safe base name used for the final muxed output and for
    /// on-disk layout under the output directory (spec §6.3).
    pub fn base_filename(&self) -> String {
        use sanitise_file_name::{sanitise_with_options, Options};
        let mut opts = Options::DEFAULT;
        opts.length_limit = 150;
        let mut name = sanitise_with_options(&self.name, &opts);
        if let (Some(s), Some(e)) = (self.season, self.episode) {
            name = format!("{name}.S{s:02}E{e:02}");
        }
        name
    }
}

/// A title plus the tracks discovered for it.
pub struct TitleTracks {
    pub title: Title,
    pub tracks: TrackSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_never_carries_season_or_episode() {
        let t = Title::movie("svc", "123", "A Movie");
        assert_eq!(t.kind, TitleKind::Movie);
        assert!(t.season.is_none() && t.episode.is_none());
    }

    #[test]
    fn tv_always_carries_both_season_and_episode() {
        let t = Title::tv("svc", "123", "A Show", 2, 5);
        assert_eq!(t.kind, TitleKind::Tv);
        assert_eq!(t.season, Some(2));
        assert_eq!(t.episode, Some(5));
        assert_eq!(t.base_filename(), "A Show.S02E05");
    }
}
