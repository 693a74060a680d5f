//! Acquire, decrypt and mux protected adaptive-streaming titles.
//!
//! This crate parses the manifest families used by on-demand video
//! streaming services — [MPEG-DASH](https://en.wikipedia.org/wiki/Dynamic_Adaptive_Streaming_over_HTTP)
//! (ISO/IEC 23009-1), HLS and Microsoft Smooth Streaming — extracts the
//! tracks and DRM metadata they describe, negotiates content keys through
//! a pluggable CDM/license-server abstraction, downloads and decrypts
//! segments, and muxes the result into a single Matroska file.
//!
//! The library is organized around a handful of independent layers:
//!
//! - [`manifest`] — parsing for DASH (`manifest::dash`), HLS
//!   (`manifest::hls`), Smooth Streaming (`manifest::ism`) and PSSH/WRMHEADER
//!   DRM metadata (`manifest::pssh`)
//! - [`model`] — the track/track-set/title data model every manifest
//!   format is flattened into
//! - [`drm`] — the abstract `Cdm` session protocol and `DrmSession` driver
//! - [`vault`] — a federation of content-key caches, read-through and
//!   write-through
//! - [`adapter`] — the `ServiceAdapter` boundary a specific streaming
//!   service implements
//! - [`orchestrator`] — the per-title pipeline tying the above together
//!
//! with `download`, `decrypt`, `postprocess`, `hybrid` and `mux` providing
//! the segment-fetch, decryption, post-processing, HDR10+Dolby-Vision
//! compositing and final-mux stages the orchestrator drives.
//!
//! ## Limitations / non-goals
//!
//! - This crate never implements CDM cryptography itself: `drm::Cdm` is an
//!   interface, not an implementation.
//! - Live/dynamic manifests (OTT broadcast) are out of scope; only VOD
//!   (static) manifests are supported.
//! - SCTE-35 ad-marker parsing and MPD XSLT preprocessing are out of scope.

#![allow(non_snake_case)]

mod error;
pub mod model;
pub mod manifest;
pub mod drm;
pub mod vault;
pub mod config;
pub mod adapter;

#[cfg(feature = "fetch")]
mod tools;
#[cfg(feature = "fetch")]
mod media;
#[cfg(feature = "fetch")]
pub mod download;
#[cfg(feature = "fetch")]
pub mod decrypt;
#[cfg(feature = "fetch")]
pub mod postprocess;
#[cfg(feature = "fetch")]
pub mod hybrid;
#[cfg(feature = "fetch")]
pub mod mux;
#[cfg(feature = "fetch")]
pub mod orchestrator;

#[cfg(feature = "sandbox")]
pub mod sandbox;

pub use error::{Error, Result};
pub use model::{
    ContentKey, Descriptor, HdrFormat, Kid, Select, Title, TitleKind, Track, TrackExtra, TrackKind,
    TrackSet, Vbitrate,
};
pub use config::Config;
