//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-playback`, `bridge-desktop`). Host applications can
//! depend on `pcm-stream-workspace` and enable the documented features without
//! needing to wire each crate individually.
//!
//! - `decoder-mp3`: MP3 frame decoding through symphonia (default)
//! - `desktop-sources`: file backed byte sources (default)
//! - `http-source`: HTTP range request byte source

pub use core_playback as playback;

#[cfg(feature = "desktop-sources")]
pub use bridge_desktop as sources;
