//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`FileSource`] - `ByteSource` over a local file using `std::fs`
//! - [`HttpRangeSource`] - `ByteSource` over HTTP range requests using `reqwest`
//!
//! ## Feature Flags
//!
//! - `http-source`: Enable the HTTP range source (pulls in `reqwest`)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::FileSource;
//! use core_playback::CodecRegistry;
//!
//! let source = FileSource::open("track.mp3")?;
//! let mut codec = CodecRegistry::with_defaults().create_for_path("track.mp3")?;
//! let info = codec.init(Box::new(source))?;
//! ```

mod file;

#[cfg(feature = "http-source")]
mod http;

pub use file::FileSource;

#[cfg(feature = "http-source")]
pub use http::HttpRangeSource;
