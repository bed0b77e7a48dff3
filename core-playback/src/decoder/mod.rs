//! # Frame Decoders
//!
//! [`FrameDecoder`](crate::traits::FrameDecoder) implementations and their
//! helpers.
//!
//! | Codec | Decoder | Feature Flag | Backend |
//! |-------|---------|--------------|---------|
//! | MP3 | [`Mp3FrameDecoder`] | `decoder-mp3` | Symphonia |
//!
//! Decoders never read from the source themselves; the engine hands them a
//! window of compressed bytes and an output slice. Libraries that are not
//! reentrant are wrapped in [`SerializedDecoder`].

mod format_detector;
mod serialized;

#[cfg(feature = "decoder-mp3")]
mod sample_converter;

#[cfg(feature = "decoder-mp3")]
mod symphonia;

pub use format_detector::FormatDetector;
pub use serialized::{DecoderLock, SerializedDecoder};

#[cfg(feature = "decoder-mp3")]
pub use self::symphonia::{
    Mp3FrameDecoder, MP3_DECODER_DELAY, MP3_LOOKAHEAD_BYTES, MP3_MAX_FRAME_BYTES,
};

#[cfg(feature = "decoder-mp3")]
pub use sample_converter::SampleConverter;
