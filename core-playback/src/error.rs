//! # Playback Error Types
//!
//! Error types for the streaming decode engine. End of stream is never an
//! error; it is reported through [`PcmRead::EndOfStream`](crate::PcmRead).

use bridge_traits::error::BridgeError;
use thiserror::Error;

use crate::config::EngineState;

/// Errors that can occur while opening, seeking or reading a track.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The byte source failed a read or seek. Fatal for the current track.
    #[error("Source read failed at byte {offset} (~{position_ms} ms): {message}")]
    SourceIo {
        offset: u64,
        position_ms: u64,
        message: String,
    },

    /// Byte source capability error raised outside the prefetch thread
    /// (metadata probing, opening).
    #[error("Byte source error: {0}")]
    Bridge(#[from] BridgeError),

    // ========================================================================
    // Open/Probe Errors
    // ========================================================================
    /// No decodable frame was found within the probe window.
    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    /// Codec is not registered in the dispatch table.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// The frame decoder reported an unrecoverable error or broke its
    /// contract (consumed or produced more bytes than it was given).
    #[error("Decoder fatal error: {0}")]
    DecoderFatal(String),

    /// Input window or output accumulator would overflow. Buffers are sized
    /// too small for the format.
    #[error("Buffer exhaustion: {0}")]
    BufferExhaustion(String),

    // ========================================================================
    // Seek Table Errors
    // ========================================================================
    /// Seek table entries are not ordered or out of range.
    #[error("Invalid seek table: {0}")]
    InvalidSeekTable(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Engine configuration failed validation.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// `read_pcm` or `seek` called before a successful `init`.
    #[error("Engine not initialized")]
    NotInitialized,

    /// Operation not allowed in the current state.
    #[error("Operation not allowed while {0:?}")]
    InvalidState(EngineState),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PlaybackError {
    /// Returns `true` if the current track must be abandoned.
    ///
    /// Lifecycle misuse leaves the track usable.
    pub fn is_fatal_for_track(&self) -> bool {
        !matches!(
            self,
            PlaybackError::NotInitialized | PlaybackError::InvalidState(_)
        )
    }

    /// Returns `true` if this error was caused by the byte source.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::SourceIo { .. } | PlaybackError::Bridge(_) | PlaybackError::IoError(_)
        )
    }

    /// Returns `true` if this error is a sizing or setup mistake rather than
    /// a property of the stream.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidConfig(_) | PlaybackError::BufferExhaustion(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
