//! Final mux: mkvmerge invocation with per-track language/name/default/
//! forced flags and OGM chapters (spec §4.10).
//!
//! Argument-building pattern (`( file )` clauses, tmp-file-then-copy, the
//! `DASHMPD_PERSIST_FILES`-style debug escape hatch, and mkvmerge's stdout-
//! not-stderr error channel quirk) is grounded on the teacher's
//! `mux_audio_video_mkvmerge` in `ffmpeg.rs`, generalized from exactly one
//! audio-plus-one-video track to an arbitrary ordered `TrackSet`.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Track, TrackKind};
use crate::tools::{classify_mkvmerge, Outcome, ToolRunner};

pub struct MuxTrack<'a> {
    pub track: &'a Track,
    pub path: PathBuf,
    pub default: bool,
    pub forced: bool,
}

/// Write an OGM-style chapter file: `CHAPTERxx=timestamp` / `CHAPTERxxNAME=title`
/// pairs, one pair per `(timestamp, title)` entry in a `Menu` track.
pub fn write_ogm_chapters(chapters: &[(String, String)], path: &Path) -> Result<()> {
    let mut out = String::new();
    for (i, (timestamp, title)) in chapters.iter().enumerate() {
        out.push_str(&format!("CHAPTER{:02}={timestamp}\n", i + 1));
        out.push_str(&format!("CHAPTER{:02}NAME={title}\n", i + 1));
    }
    std::fs::write(path, out).map_err(|e| Error::Io(e, format!("writing chapter file {}", path.display())))
}

/// Mux an ordered set of tracks (already sorted via
/// `TrackSet::sort_for_mux`) plus an optional chapters file into a single
/// Matroska output.
pub async fn mux(config: &Config, output_path: &Path, tracks: &[MuxTrack<'_>], chapters_path: Option<&Path>) -> Result<()> {
    let tmp = tempfile::Builder::new()
        .suffix(".mkv")
        .tempfile_in(config.output_dir.clone())
        .map_err(|e| Error::Io(e, String::from("creating temporary mkvmerge output")))?;
    let tmppath = tmp.path().to_path_buf();

    let mut args: Vec<String> = vec![String::from("--output"), tmppath.display().to_string()];
    let mut has_video = false;
    let mut has_audio = false;
    for mt in tracks {
        match &mt.track.kind {
            TrackKind::Video(_) => has_video = true,
            TrackKind::Audio(_) => has_audio = true,
            _ => {}
        }
        args.push(String::from("--language"));
        args.push(format!("0:{}", mt.track.language));
        args.push(String::from("--track-name"));
        args.push(format!("0:{}", track_name(mt.track)));
        args.push(String::from("--default-track"));
        args.push(format!("0:{}", if mt.default { "yes" } else { "no" }));
        if matches!(mt.track.kind, TrackKind::Text(_)) {
            args.push(String::from("--forced-track"));
            args.push(format!("0:{}", if mt.forced { "yes" } else { "no" }));
        }
        args.push(String::from("("));
        args.push(mt.path.display().to_string());
        args.push(String::from(")"));
    }
    if let Some(ch) = chapters_path {
        args.push(String::from("--chapters"));
        args.push(ch.display().to_string());
    }
    if !has_video {
        warn!("muxing without a video track");
    }
    if !has_audio {
        warn!("muxing without an audio track");
    }

    let output = ToolRunner::run(&config.mkvmerge_location, &args, classify_mkvmerge).await;
    match output {
        Ok(out) if out.status.success() || mkvmerge_only_warned(&out) => {
            copy_into_place(&tmppath, output_path)?;
            cleanup_tmp(&tmppath);
            cleanup_track_inputs(tracks);
            Ok(())
        }
        Ok(out) => {
            // mkvmerge writes its error detail to stdout, not stderr.
            let msg = String::from_utf8_lossy(&out.stdout);
            Err(Error::MuxFailed(msg.into_owned()))
        }
        Err(e) => Err(e),
    }
}

/// On a successful mux, every per-track intermediate file has been folded
/// into the output and is no longer needed (spec §4.9).
fn cleanup_track_inputs(tracks: &[MuxTrack<'_>]) {
    if std::env::var("VAULT_ACQUIRE_PERSIST_FILES").is_ok() {
        return;
    }
    for mt in tracks {
        if let Err(e) = std::fs::remove_file(&mt.path) {
            warn!("error deleting intermediate track file {}: {e}", mt.path.display());
        }
    }
}

fn mkvmerge_only_warned(out: &std::process::Output) -> bool {
    out.status.code() == Some(1)
}

fn track_name(track: &Track) -> String {
    match &track.kind {
        TrackKind::Video(v) => format!("{} {}p", v.codec, v.height),
        TrackKind::Audio(a) => if a.atmos { String::from("Atmos") } else { a.codec.clone() },
        TrackKind::Text(t) => if t.sdh { String::from("SDH") } else { String::from("Subtitle") },
        TrackKind::Menu(_) => String::from("Chapters"),
    }
}

fn copy_into_place(tmppath: &Path, output_path: &Path) -> Result<()> {
    let tmpfile = fs::File::open(tmppath)
        .map_err(|e| Error::Io(e, String::from("opening mkvmerge output")))?;
    let mut muxed = BufReader::new(tmpfile);
    let outfile = fs::File::create(output_path)
        .map_err(|e| Error::Io(e, String::from("opening final output file")))?;
    let mut sink = BufWriter::new(outfile);
    std::io::copy(&mut muxed, &mut sink)
        .map_err(|e| Error::Io(e, String::from("copying mkvmerge output into place")))?;
    Ok(())
}

fn cleanup_tmp(tmppath: &Path) {
    if std::env::var("VAULT_ACQUIRE_PERSIST_FILES").is_err() {
        if let Err(e) = std::fs::remove_file(tmppath) {
            warn!("error deleting temporary mkvmerge output: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ogm_chapters_number_from_one_and_pair_name_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapters.txt");
        let chapters = vec![
            (String::from("00:00:00.000"), String::from("Intro")),
            (String::from("00:05:12.500"), String::from("Part Two")),
        ];
        write_ogm_chapters(&chapters, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "CHAPTER01=00:00:00.000\n\
             CHAPTER01NAME=Intro\n\
             CHAPTER02=00:05:12.500\n\
             CHAPTER02NAME=Part Two\n"
        );
    }
}
