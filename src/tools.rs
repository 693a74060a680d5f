//! Uniform subprocess invocation for external binaries (mp4decrypt,
//! shaka-packager, ffmpeg, mkvmerge, ccextractor, dovi_tool).
//!
//! Every stage that used to spawn `Command` directly in the teacher
//! (`decryption.rs`'s `decrypt_mp4decrypt`/`decrypt_shaka`, `ffmpeg.rs`'s
//! `mux_audio_video_mkvmerge`) now funnels through this one call site, per
//! the REDESIGN FLAGS in `SPEC_FULL.md` §9. The success/recoverable/fatal
//! classification follows the teacher's pattern of treating a non-zero
//! exit code and a missing/empty output file as the same kind of failure,
//! generalized into the exit-code table from spec §6.2.

use std::path::Path;
use std::process::Output;

use tracing::{info, warn, error};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Non-zero but the tool documents this as a warning (mkvmerge exit
    /// code 1: "at least one warning was issued").
    RecoverableWarning,
    Fatal,
}

pub struct ToolRunner;

impl ToolRunner {
    /// Run `binary` with `args`, classify its exit code via `classify`, and
    /// log truncated stdout/stderr on anything other than a clean success —
    /// mirroring `partial_process_output`'s truncation in the teacher.
    pub async fn run(binary: &str, args: &[String], classify: impl Fn(i32) -> Outcome) -> Result<Output> {
        let output = tokio::process::Command::new(binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolMissing(binary.to_string())
                } else {
                    Error::Io(e, format!("spawning {binary}"))
                }
            })?;
        let code = output.status.code().unwrap_or(-1);
        match classify(code) {
            Outcome::Success => {
                info!("{binary} exited successfully");
                Ok(output)
            }
            Outcome::RecoverableWarning => {
                warn!("{binary} exited with warnings (code {code}): {}", truncated(&output.stdout));
                Ok(output)
            }
            Outcome::Fatal => {
                error!("{binary} failed (code {code}): {}", truncated(&output.stderr));
                Err(Error::ToolFailed {
                    tool: binary.to_string(),
                    code: output.status.code(),
                    detail: truncated(&output.stderr).into_owned(),
                })
            }
        }
    }

    /// A tool succeeded in exit-code terms but the output file it was
    /// supposed to produce is missing or empty — still a fatal condition,
    /// just detected a layer up from the exit code itself.
    pub async fn require_nonempty_output(tool: &str, path: &Path) -> Result<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Error::DownloadEmpty(path.to_path_buf())),
            Err(_) => Err(Error::ToolFailed {
                tool: tool.to_string(),
                code: None,
                detail: format!("expected output file {} was not created", path.display()),
            }),
        }
    }
}

fn truncated(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    let s = String::from_utf8_lossy(bytes);
    if s.len() > 2000 {
        std::borrow::Cow::Owned(format!("{}... [truncated]", &s[..2000]))
    } else {
        s
    }
}

/// Standard exit-code classification for the most common tool, mkvmerge:
/// 0 success, 1 warning, ≥2 fatal (spec §6.2).
pub fn classify_mkvmerge(code: i32) -> Outcome {
    match code {
        0 => Outcome::Success,
        1 => Outcome::RecoverableWarning,
        _ => Outcome::Fatal,
    }
}

/// mp4decrypt/shaka-packager/ffmpeg/dovi_tool: any non-zero exit is fatal,
/// there is no documented recoverable-warning code.
pub fn classify_strict(code: i32) -> Outcome {
    if code == 0 { Outcome::Success } else { Outcome::Fatal }
}

/// ccextractor's exit-code table (spec §6.2) documents two success codes:
/// 0 ("no errors") and 10 ("no captions found"). Anything else is fatal.
pub fn classify_ccextractor(code: i32) -> Outcome {
    match code {
        0 | 10 => Outcome::Success,
        _ => Outcome::Fatal,
    }
}
