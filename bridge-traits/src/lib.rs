//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the decode engine and
//! platform-specific implementations. Each trait represents a capability the
//! engine requires but that must be implemented differently per platform
//! (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### I/O
//! - [`ByteSource`](source::ByteSource) - Seekable blocking byte stream feeding the decoder
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Files, HTTP ranges |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., file paths, HTTP status)
//!
//! ## Thread Safety
//!
//! A `ByteSource` is handed to the engine's prefetch thread and only needs
//! `Send`. `LoggerSink` is shared between threads and needs `Send + Sync`.
//!
//! ## Examples
//!
//! ### Implementing ByteSource
//!
//! ```ignore
//! use bridge_traits::source::ByteSource;
//! use bridge_traits::error::Result;
//! use std::io::SeekFrom;
//!
//! pub struct AssetSource {
//!     asset: platform::Asset,
//! }
//!
//! impl ByteSource for AssetSource {
//!     fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
//!         Ok(self.asset.read(buf)?)
//!     }
//!
//!     fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
//!         Ok(self.asset.seek(pos)?)
//!     }
//!
//!     fn length(&self) -> Option<u64> {
//!         Some(self.asset.len())
//!     }
//!
//!     fn at_end(&self) -> bool {
//!         self.asset.is_eof()
//!     }
//! }
//! ```

pub mod error;
pub mod logging;
pub mod source;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use source::{read_fully, ByteSource, MemorySource};
