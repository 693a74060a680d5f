//! Crate-wide error type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error while {1}: {0}")]
    Io(#[source] std::io::Error, String),

    #[error("network error: {0}")]
    Network(String),

    #[error("manifest could not be parsed: {0}")]
    ManifestError(String),

    #[error("no track matched the requested selection")]
    NoMatchingTrack,

    #[error("no original-language track was found")]
    NoOriginalLanguage,

    #[error("could not obtain a PSSH for this track")]
    PsshUnobtainable,

    #[error("could not obtain a key id for this track")]
    KidUnobtainable,

    #[error("license server refused the challenge: {0}")]
    LicenseRefused(String),

    #[error("no content key available for kid {0}")]
    NoContentKey(String),

    #[error("no vault in the federation is reachable")]
    VaultUnavailable,

    #[error("required external tool not found: {0}")]
    ToolMissing(String),

    #[error("external tool {tool} failed (exit code {code:?}): {detail}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("downloaded file {0:?} is empty or missing")]
    DownloadEmpty(PathBuf),

    #[error("muxing failed: {0}")]
    MuxFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
