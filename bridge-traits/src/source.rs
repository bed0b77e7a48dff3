//! Byte Source Abstraction
//!
//! Provides the blocking, seekable byte stream the decode engine pulls
//! compressed audio from. Implementations exist per platform:
//! - Desktop: local files, HTTP range requests
//! - Mobile: sandboxed documents, platform download managers
//! - Tests/cache: in-memory buffers ([`MemorySource`])
//!
//! A `ByteSource` is driven from exactly one thread at a time (the engine's
//! prefetch worker), so implementations only need to be `Send`.
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::source::ByteSource;
//! use std::io::SeekFrom;
//!
//! fn read_header(source: &mut dyn ByteSource) -> bridge_traits::error::Result<[u8; 4]> {
//!     let mut header = [0u8; 4];
//!     source.seek(SeekFrom::Start(0))?;
//!     source.read(&mut header)?;
//!     Ok(header)
//! }
//! ```

use bytes::Bytes;
use std::io::SeekFrom;

use crate::error::{BridgeError, Result};

/// Seekable, blocking byte stream.
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` signals end of data.
    ///
    /// May block on disk or network I/O.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition the stream, returning the new absolute offset.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Total length in bytes, if known. Network streams may report `None`.
    fn length(&self) -> Option<u64>;

    /// Whether the last read reached the end of the data.
    fn at_end(&self) -> bool;

    /// Release the underlying handle. Further reads are an error.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short label used in log fields.
    fn description(&self) -> String {
        "byte-source".to_string()
    }
}

/// Read until `buf` is full or the source reports end of data.
///
/// Returns the number of bytes read, which is less than `buf.len()` only at
/// end of data.
pub fn read_fully(source: &mut dyn ByteSource, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Resolve a [`SeekFrom`] against a current position and optional length.
///
/// Shared by implementations that track their own cursor.
pub fn resolve_seek(pos: SeekFrom, current: u64, length: Option<u64>) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => {
            let len = length.ok_or_else(|| {
                BridgeError::InvalidSeek("seek from end on a source of unknown length".to_string())
            })?;
            len.checked_add_signed(delta)
        }
    };

    target.ok_or_else(|| BridgeError::InvalidSeek(format!("{:?} from offset {}", pos, current)))
}

/// In-memory byte source
///
/// Serves already downloaded or cached audio without touching the
/// filesystem. Cloning the backing [`Bytes`] is cheap, so several sources
/// can share one buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    position: u64,
    closed: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            closed: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(BridgeError::NotAvailable("memory source is closed".to_string()));
        }

        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, Some(self.data.len() as u64))?;
        Ok(self.position)
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn at_end(&self) -> bool {
        self.position >= self.data.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn description(&self) -> String {
        format!("memory({} bytes)", self.data.len())
    }
}
