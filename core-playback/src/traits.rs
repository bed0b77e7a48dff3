//! # Core Playback Traits
//!
//! This module defines the capability interfaces the decode engine consumes
//! and the value types that cross them.
//!
//! ## Architecture
//!
//! The engine pulls compressed bytes from a [`ByteSource`] on a prefetch
//! thread and decodes them on the caller's thread:
//!
//! ```text
//!  ByteSource ──prefetch thread──▶ PrefetchRingBuffer
//!                                        │ (non-blocking read)
//!                                        ▼
//!                                  FrameInputStage ──▶ FrameDecoder
//!                                                          │ PCM
//!                                                          ▼
//!                      GaplessTrimmer ◀── DecodedOutputStage ──▶ read_pcm()
//! ```
//!
//! - **FrameDecoder**: turns one compressed frame at a time into interleaved
//!   PCM. Implementations never block and never own the byte stream.
//! - **SeekMetadataProvider**: optional container/tag metadata with an
//!   embedded seek table and gapless padding information.
//!
//! ## Threading Model
//!
//! A `FrameDecoder` is driven only from the consumer thread, but it is moved
//! into the engine, so it must be `Send`. Decoders wrapping non-reentrant
//! libraries share a lock through
//! [`SerializedDecoder`](crate::decoder::SerializedDecoder).
//!
//! [`ByteSource`]: bridge_traits::source::ByteSource

use serde::{Deserialize, Serialize};

use crate::gapless::GaplessInfo;
use crate::seek_table::SeekTableEntry;

// ============================================================================
// Audio Format Types
// ============================================================================

/// Supported audio codecs.
///
/// Use [`AudioCodec::Other`] for platform-specific or proprietary codecs
/// registered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1/2/2.5 Audio Layer 3
    Mp3,
    /// Advanced Audio Coding (AAC/M4A)
    Aac,
    /// Free Lossless Audio Codec
    Flac,
    /// Ogg Vorbis
    Vorbis,
    /// Opus (low-latency codec)
    Opus,
    /// Waveform Audio File Format
    Wav,
    /// Apple Lossless Audio Codec
    Alac,
    /// Codec not recognized
    Unknown,
    /// Custom or proprietary codec
    Other(String),
}

impl AudioCodec {
    /// Returns `true` if this is a lossless codec.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioCodec::Flac | AudioCodec::Wav | AudioCodec::Alac)
    }

    /// Returns `true` if this codec is lossy.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            AudioCodec::Mp3 | AudioCodec::Aac | AudioCodec::Vorbis | AudioCodec::Opus
        )
    }
}

/// Audio format describing the decoded PCM output.
///
/// PCM is always interleaved, little endian, signed integer at
/// `bits_per_sample`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Source codec (before decoding)
    pub codec: AudioCodec,
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,
    /// Bits per output sample (e.g., 16, 24)
    pub bits_per_sample: u16,
    /// Nominal bitrate in kbps of the compressed stream, if known
    pub bitrate: Option<u32>,
}

impl AudioFormat {
    /// Create a new audio format descriptor.
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bits_per_sample,
            bitrate: None,
        }
    }

    /// Attach the compressed stream's bitrate.
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = Some(kbps);
        self
    }

    /// Standard CD quality (44.1 kHz, 16-bit stereo)
    pub fn cd_quality() -> Self {
        Self::new(AudioCodec::Wav, 44100, 2, 16)
    }

    /// Bytes per interleaved sample frame (all channels).
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Number of whole sample frames in `bytes`.
    pub fn bytes_to_samples(&self, bytes: usize) -> u64 {
        match self.block_align() {
            0 => 0,
            align => (bytes / align) as u64,
        }
    }

    /// Byte length of `samples` sample frames.
    pub fn samples_to_bytes(&self, samples: u64) -> usize {
        samples as usize * self.block_align()
    }

    /// Duration of `samples` sample frames in milliseconds (floor).
    pub fn samples_to_ms(&self, samples: u64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        samples * 1000 / self.sample_rate as u64
    }

    /// First sample frame at or after `ms` milliseconds, so that
    /// `samples_to_ms(ms_to_samples(ms)) == ms` for rates of 1 kHz and up.
    pub fn ms_to_samples(&self, ms: u64) -> u64 {
        (ms * self.sample_rate as u64).div_ceil(1000)
    }

    /// Returns `true` if the format can describe PCM output.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0
            && self.channels > 0
            && self.bits_per_sample > 0
            && self.bits_per_sample % 8 == 0
    }
}

// ============================================================================
// Frame Decoder Capability
// ============================================================================

/// Result of [`FrameDecoder::probe_format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The stream format could be determined from the supplied bytes.
    Format(AudioFormat),
    /// More bytes are needed before the format can be determined.
    NeedMoreInput,
}

/// Result of one [`FrameDecoder::decode_next`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The window does not hold a complete frame.
    NeedMoreInput,
    /// One frame was decoded: `consumed` input bytes, `produced` PCM bytes
    /// written to the front of the output slice. Metadata frames report
    /// `produced == 0`.
    Decoded { consumed: usize, produced: usize },
    /// The window does not start on a valid frame; skip `skip` bytes and
    /// retry. A skip of 0 is treated as 1.
    Resync { skip: usize },
    /// Unrecoverable decoder failure.
    Fatal(String),
}

/// Frame-at-a-time decoder for one codec.
///
/// The engine owns the input window and output buffer; the decoder only sees
/// slices of them. A decoder must never block.
pub trait FrameDecoder: Send {
    /// Codec handled by this decoder.
    fn codec(&self) -> AudioCodec;

    /// Determine the PCM output format from the start of the stream.
    ///
    /// Leading junk may be skipped internally; the bytes are not consumed.
    fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome;

    /// Decode the frame at the start of `input` into `output`.
    ///
    /// `output` is always at least [`max_frame_bytes`](Self::max_frame_bytes)
    /// long.
    fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome;

    /// Discard internal state (overlap buffers, bit reservoir). Called on
    /// seek.
    fn flush(&mut self);

    /// Largest number of PCM bytes a single `decode_next` call can produce.
    fn max_frame_bytes(&self) -> usize;

    /// Bytes of trailing context the last frame needs to decode.
    fn lookahead_bytes(&self) -> usize {
        0
    }

    /// Samples of algorithmic delay at the start of decoded output.
    fn decoder_delay_samples(&self) -> u64 {
        0
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn codec(&self) -> AudioCodec {
        (**self).codec()
    }

    fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome {
        (**self).probe_format(input)
    }

    fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome {
        (**self).decode_next(input, output)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn max_frame_bytes(&self) -> usize {
        (**self).max_frame_bytes()
    }

    fn lookahead_bytes(&self) -> usize {
        (**self).lookahead_bytes()
    }

    fn decoder_delay_samples(&self) -> u64 {
        (**self).decoder_delay_samples()
    }
}

// ============================================================================
// Seek Metadata Capability
// ============================================================================

/// Optional metadata parsed from container headers or tags.
///
/// Every method may return `None`; absence selects the estimated seek table
/// and disables gapless trimming.
pub trait SeekMetadataProvider {
    /// Embedded seek table as `(fraction of duration, absolute byte offset)`
    /// pairs.
    fn seek_points(&self) -> Option<Vec<SeekTableEntry>>;

    /// Encoder delay and padding.
    fn gapless_info(&self) -> Option<GaplessInfo>;

    /// Exact playable duration, if the metadata states it.
    fn duration_ms(&self) -> Option<u64> {
        None
    }

    /// Samples per channel the decoder outputs for the whole stream,
    /// delay and padding included.
    fn total_samples(&self) -> Option<u64> {
        None
    }

    /// Offset of the first audio byte (after leading tags).
    fn audio_start(&self) -> u64 {
        0
    }

    /// Offset one past the last audio byte (before trailing tags).
    fn audio_end(&self) -> Option<u64> {
        None
    }
}

// ============================================================================
// Engine Results
// ============================================================================

/// Description of an opened stream returned by `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Decoded PCM format.
    pub format: AudioFormat,
    /// Playable duration in milliseconds; 0 when unknown.
    pub total_time_ms: u64,
    /// Whether `seek` can reposition the stream.
    pub seekable: bool,
    /// Gapless trim applied to this stream.
    pub gapless: Option<GaplessInfo>,
}

/// Result of a `read_pcm` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmRead {
    /// `n` bytes of PCM were written to the front of the buffer.
    Data(usize),
    /// No PCM is available yet; the prefetch thread is still filling. Call
    /// again later.
    Pending,
    /// The track has ended. Returned for every subsequent call.
    EndOfStream,
}

impl PcmRead {
    /// Bytes written, 0 for `Pending`/`EndOfStream`.
    pub fn bytes(&self) -> usize {
        match self {
            PcmRead::Data(n) => *n,
            _ => 0,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, PcmRead::EndOfStream)
    }
}
