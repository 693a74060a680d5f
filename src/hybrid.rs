//! HDR10+Dolby Vision hybrid compositor: extract the RPU (reference
//! processing unit) metadata from a Dolby Vision elementary stream and
//! inject it into an HDR10 elementary stream, producing a single track
//! that carries both (spec §4.9; grounded on `tracks.py`'s `make_hybrid`).

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tools::{classify_strict, ToolRunner};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_OUTPUT_BYTES: u64 = 10 * 1024;

/// Extract an HEVC elementary stream from a container, no re-encode.
pub async fn extract_hevc(config: &Config, in_path: &Path, out_path: &Path) -> Result<()> {
    let args = vec![
        String::from("-y"),
        String::from("-i"), in_path.display().to_string(),
        String::from("-c:v"), String::from("copy"),
        String::from("-bsf:v"), String::from("hevc_mp4toannexb"),
        out_path.display().to_string(),
    ];
    ToolRunner::run(&config.ffmpeg_location, &args, classify_strict).await?;
    ToolRunner::require_nonempty_output("ffmpeg", out_path).await
}

pub async fn extract_rpu(config: &Config, dv_elementary: &Path, rpu_out: &Path) -> Result<()> {
    let args = vec![
        String::from("extract-rpu"),
        dv_elementary.display().to_string(),
        String::from("-o"), rpu_out.display().to_string(),
    ];
    ToolRunner::run(&config.dovi_tool_location, &args, classify_strict).await?;
    wait_for_file(rpu_out).await
}

pub async fn inject_rpu(config: &Config, hdr10_elementary: &Path, rpu: &Path, hybrid_out: &Path) -> Result<()> {
    let args = vec![
        String::from("inject-rpu"),
        String::from("-i"), hdr10_elementary.display().to_string(),
        String::from("--rpu-in"), rpu.display().to_string(),
        String::from("-o"), hybrid_out.display().to_string(),
    ];
    ToolRunner::run(&config.dovi_tool_location, &args, classify_strict).await?;
    wait_for_file(hybrid_out).await
}

/// `dovi_tool` can return before its output file is fully flushed to disk
/// on some filesystems; poll for a plausible minimum size rather than
/// trusting the exit code alone, matching spec §4.9's edge case.
async fn wait_for_file(path: &Path) -> Result<()> {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.len() >= MIN_OUTPUT_BYTES {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::ToolFailed {
                tool: String::from("dovi_tool"),
                code: None,
                detail: format!("output file {} did not reach {MIN_OUTPUT_BYTES} bytes within {POLL_TIMEOUT:?}", path.display()),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Full compositor pipeline: HDR10 base layer + Dolby Vision enhancement
/// layer in, one hybrid HEVC elementary stream out.
pub async fn make_hybrid(config: &Config, hdr10_mp4: &Path, dv_mp4: &Path, work_dir: &Path, hybrid_out: &Path) -> Result<()> {
    let hdr10_es = work_dir.join("hdr10.hevc");
    let dv_es = work_dir.join("dv.hevc");
    let rpu = work_dir.join("rpu.bin");
    extract_hevc(config, hdr10_mp4, &hdr10_es).await?;
    extract_hevc(config, dv_mp4, &dv_es).await?;
    extract_rpu(config, &dv_es, &rpu).await?;
    info!("injecting Dolby Vision RPU into HDR10 base layer");
    inject_rpu(config, &hdr10_es, &rpu, hybrid_out).await
}
