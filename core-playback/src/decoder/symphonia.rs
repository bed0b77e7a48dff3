//! # MP3 Frame Decoder
//!
//! Frame-at-a-time MP3 decoding on top of Symphonia's MPEG audio codec.
//! The engine hands over a window of compressed bytes; this adapter finds
//! the frame boundary from the MPEG header, wraps exactly one frame in a
//! Symphonia [`Packet`] and converts the result to interleaved `s16le`.

use crate::decoder::sample_converter::SampleConverter;
use crate::metadata::mpeg::{find_frame_sync, FrameHeader, Layer, HEADER_LEN};
use crate::metadata::xing::{parse_vbri, parse_xing};
use crate::traits::{AudioCodec, AudioFormat, DecodeOutcome, FrameDecoder, ProbeOutcome};
use symphonia::core::audio::Channels;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, trace, warn};

/// Algorithmic delay of the MPEG layer III synthesis filterbank.
pub const MP3_DECODER_DELAY: u64 = 529;

/// Trailing bytes the final frame may need.
pub const MP3_LOOKAHEAD_BYTES: usize = 8;

/// 1152 stereo samples of 16-bit PCM.
pub const MP3_MAX_FRAME_BYTES: usize = 1152 * 2 * 2;

/// MP3 [`FrameDecoder`] backed by Symphonia.
pub struct Mp3FrameDecoder {
    decoder: Option<Box<dyn Decoder>>,
    stream: Option<FrameHeader>,
    frames_decoded: u64,
}

impl Mp3FrameDecoder {
    pub fn new() -> Self {
        Self {
            decoder: None,
            stream: None,
            frames_decoded: 0,
        }
    }

    /// Frames handed to Symphonia since creation.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    fn codec_decoder(&mut self, header: &FrameHeader) -> Result<&mut Box<dyn Decoder>, String> {
        if self.decoder.is_none() {
            let channels = match header.channels() {
                1 => Channels::FRONT_LEFT,
                _ => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            };
            let mut params = CodecParameters::new();
            params
                .for_codec(CODEC_TYPE_MP3)
                .with_sample_rate(header.sample_rate)
                .with_channels(channels);

            let decoder = symphonia::default::get_codecs()
                .make(&params, &DecoderOptions::default())
                .map_err(|e| format!("failed to create MP3 decoder: {}", e))?;
            debug!(
                sample_rate = header.sample_rate,
                channels = header.channels(),
                "Created Symphonia MP3 decoder"
            );
            self.decoder = Some(decoder);
        }

        self.decoder
            .as_mut()
            .ok_or_else(|| "MP3 decoder unavailable".to_string())
    }

    /// Distance to the next possible sync byte after `input[0]`.
    fn next_candidate(input: &[u8]) -> usize {
        input
            .iter()
            .skip(1)
            .position(|&b| b == 0xFF)
            .map_or(input.len(), |p| p + 1)
    }
}

impl Default for Mp3FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for Mp3FrameDecoder {
    fn codec(&self) -> AudioCodec {
        AudioCodec::Mp3
    }

    fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome {
        match find_frame_sync(input) {
            Some((offset, header)) => {
                debug!(
                    offset,
                    sample_rate = header.sample_rate,
                    channels = header.channels(),
                    bitrate = header.bitrate_kbps,
                    "MP3 stream identified"
                );
                self.stream = Some(header);
                ProbeOutcome::Format(
                    AudioFormat::new(AudioCodec::Mp3, header.sample_rate, header.channels(), 16)
                        .with_bitrate(header.bitrate_kbps),
                )
            }
            None => ProbeOutcome::NeedMoreInput,
        }
    }

    fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome {
        if input.len() < HEADER_LEN {
            return DecodeOutcome::NeedMoreInput;
        }

        let Some(header) = FrameHeader::parse(input) else {
            return DecodeOutcome::Resync {
                skip: Self::next_candidate(input),
            };
        };
        if header.layer != Layer::III
            || self.stream.is_some_and(|stream| !stream.is_compatible(&header))
        {
            return DecodeOutcome::Resync { skip: 1 };
        }

        let len = header.frame_length();
        if input.len() < len {
            return DecodeOutcome::NeedMoreInput;
        }
        let frame = &input[..len];

        if parse_xing(frame, &header).is_some() || parse_vbri(frame).is_some() {
            trace!(len, "Skipping VBR header frame");
            return DecodeOutcome::Decoded {
                consumed: len,
                produced: 0,
            };
        }

        let ts = self.frames_decoded * header.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, ts, header.samples_per_frame() as u64, frame);
        let decoder = match self.codec_decoder(&header) {
            Ok(decoder) => decoder,
            Err(message) => return DecodeOutcome::Fatal(message),
        };

        let outcome = match decoder.decode(&packet) {
            Ok(decoded) => match SampleConverter::write_interleaved_s16le(&decoded, output) {
                Ok(produced) => DecodeOutcome::Decoded {
                    consumed: len,
                    produced,
                },
                Err(e) => DecodeOutcome::Fatal(e.to_string()),
            },
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(len, error = e, "Dropping undecodable MP3 frame");
                DecodeOutcome::Resync { skip: len }
            }
            Err(SymphoniaError::IoError(e)) => {
                warn!(len, error = %e, "Dropping truncated MP3 frame");
                DecodeOutcome::Resync { skip: len }
            }
            Err(e) => DecodeOutcome::Fatal(format!("MP3 decoder failed: {}", e)),
        };

        if matches!(outcome, DecodeOutcome::Decoded { .. }) {
            self.frames_decoded += 1;
        }
        outcome
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
    }

    fn max_frame_bytes(&self) -> usize {
        MP3_MAX_FRAME_BYTES
    }

    fn lookahead_bytes(&self) -> usize {
        MP3_LOOKAHEAD_BYTES
    }

    fn decoder_delay_samples(&self) -> u64 {
        MP3_DECODER_DELAY
    }
}
