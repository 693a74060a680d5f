//! Container introspection shared by the decode, post-process and hybrid
//! stages: sniffing a downloaded file's actual container/codec rather than
//! trusting its extension.
//!
//! Ported from the teacher's `media.rs`; the video-stream-concatenation
//! helpers (`video_containers_concatable`) have no counterpart here — this
//! crate never merges multiple video files with the ffmpeg concat filter —
//! and are dropped (DESIGN.md).

use std::path::{Path, PathBuf};

use file_format::FileFormat;
use tracing::warn;

use crate::error::{Error, Result};

/// Returns "mp4", "mkv", "eac3" etc, based on analyzing the file's content
/// rather than its extension — needed because the ISM Atmos fix (spec
/// §4.7) produces bare elementary streams that ffmpeg and mkvmerge
/// otherwise misdetect.
#[tracing::instrument(level = "trace")]
pub(crate) fn container_type(container: &Path) -> Result<String> {
    let format = FileFormat::from_file(container)
        .map_err(|e| Error::Io(e, String::from("determining container type")))?;
    Ok(format.extension().to_string())
}

/// Frame rate as returned by ffprobe is a rational number serialized as
/// "24/1" for example.
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let numerator = num.parse::<u64>().ok()?;
    let denominator = den.parse::<u64>().ok()?;
    Some(numerator as f64 / denominator as f64)
}

#[tracing::instrument(level = "trace")]
pub(crate) fn container_only_audio(path: &PathBuf) -> bool {
    match ffprobe::ffprobe(path) {
        Ok(meta) => meta.streams.iter().all(|s| s.codec_type.as_deref() == Some("audio")),
        Err(e) => {
            warn!("error running ffprobe on {}: {e}", path.display());
            false
        }
    }
}

#[tracing::instrument(level = "trace")]
pub(crate) fn container_has_audio(path: &PathBuf) -> bool {
    match ffprobe::ffprobe(path) {
        Ok(meta) => meta.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio")),
        Err(_) => false,
    }
}

#[tracing::instrument(level = "trace")]
pub(crate) fn container_has_video(path: &PathBuf) -> bool {
    match ffprobe::ffprobe(path) {
        Ok(meta) => meta.streams.iter().any(|s| s.codec_type.as_deref() == Some("video")),
        Err(_) => false,
    }
}

// mkvmerge on Windows is compiled using MinGW and isn't able to handle native pathnames, so we
// create the temporary file in the current directory.
#[cfg(target_os = "windows")]
pub(crate) fn temporary_outpath(suffix: &str) -> Result<String> {
    Ok(format!("vault-acquire-tmp{suffix}"))
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn temporary_outpath(suffix: &str) -> Result<String> {
    let tmpout = tempfile::Builder::new()
        .prefix("vault-acquire")
        .suffix(suffix)
        .rand_bytes(5)
        .tempfile()
        .map_err(|e| Error::Io(e, String::from("creating temporary output file")))?;
    match tmpout.path().to_str() {
        Some(s) => Ok(s.to_string()),
        None => Ok(format!("/tmp/vault-acquire-tmp{suffix}")),
    }
}
