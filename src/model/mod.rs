//! Canonical data model: titles, tracks, track sets and content keys.
//!
//! The Python original (`vinetrimmer/objects/tracks.py`) models `Video`,
//! `Audio`, `Subtitle` and `Menu` as subclasses of a common `Track` base
//! class, dispatching on `isinstance` checks throughout the download and
//! mux pipeline. Rust has no open-ended inheritance, and duck-typing the
//! same behaviour with trait objects would just relocate the `isinstance`
//! checks into downcasts. Instead `Track` is a sum type (`TrackKind`) with
//! one variant per media kind, and the operations every kind supports
//! (selection key, drm descriptor, mux ordering) live on the `Track`
//! struct itself rather than being duplicated per subtype.

mod track;
mod trackset;
mod title;
mod key;

pub use track::{Track, TrackKind, VideoTrack, AudioTrack, TextTrack, MenuTrack, Descriptor, HdrFormat, TrackExtra};
pub use trackset::{TrackSet, Select, Vbitrate};
pub use title::{Title, TitleKind};
pub use key::{ContentKey, Kid};
