//! # Streaming Decode Engine
//!
//! Pull-based compressed audio decoding with background prefetch,
//! sample-accurate gapless trimming and VBR-aware seeking.
//!
//! ## Overview
//!
//! This crate handles:
//! - Prefetching compressed bytes from a [`ByteSource`](bridge_traits::source::ByteSource)
//!   on a dedicated thread ([`PrefetchRingBuffer`])
//! - Frame-at-a-time decoding through the [`FrameDecoder`] capability, with
//!   resync on corrupt data ([`FrameInputStage`])
//! - Bounded PCM accumulation with backpressure ([`OutputAccumulator`])
//! - Encoder delay/padding removal ([`GaplessTrimmer`])
//! - Time to byte offset mapping ([`VbrSeekTable`])
//! - MP3 container metadata (ID3, Xing/Info, LAME, VBRI) and an MP3 decoder
//!   backed by symphonia (feature `decoder-mp3`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use core_playback::{CodecRegistry, EngineConfig, PcmRead};
//! use bridge_traits::source::MemorySource;
//! use std::path::Path;
//!
//! # fn main() -> core_playback::Result<()> {
//! let registry = CodecRegistry::with_defaults(EngineConfig::local_file());
//! let mut codec = registry.create_for_path(Path::new("track.mp3"))?;
//! let info = codec.init(Box::new(MemorySource::new(std::fs::read("track.mp3")?)))?;
//! println!("{} ms at {} Hz", info.total_time_ms, info.format.sample_rate);
//!
//! let mut pcm = vec![0u8; 4608];
//! while let PcmRead::Data(_) | PcmRead::Pending = codec.read_pcm(&mut pcm)? {}
//! codec.deinit();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod gapless;
pub mod input;
pub mod metadata;
pub mod output;
pub mod ring_buffer;
pub mod seek_table;
pub mod traits;

pub use codec::{CodecRegistry, DecoderFactory, FormatCodec, MetadataReader, PcmCodec};
pub use config::{EngineConfig, EngineState, EngineStats};
pub use decoder::{DecoderLock, FormatDetector, SerializedDecoder};
pub use engine::{PlaybackPosition, StreamingDecodeEngine};
pub use error::{PlaybackError, Result};
pub use gapless::{GaplessInfo, GaplessTrimmer};
pub use input::{FrameEvent, FrameInputStage};
pub use metadata::Mp3SeekMetadata;
pub use output::OutputAccumulator;
pub use ring_buffer::{PrefetchOptions, PrefetchRingBuffer, SourceFailure};
pub use seek_table::{SeekTableEntry, VbrSeekTable};
pub use traits::{
    AudioCodec, AudioFormat, DecodeOutcome, FrameDecoder, PcmRead, ProbeOutcome,
    SeekMetadataProvider, StreamInfo,
};

#[cfg(feature = "decoder-mp3")]
pub use decoder::Mp3FrameDecoder;
