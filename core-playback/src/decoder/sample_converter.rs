//! # Sample Format Converter
//!
//! Converts Symphonia's planar buffers to the engine's PCM layout:
//! interleaved, signed 16-bit, little endian.

use crate::error::{PlaybackError, Result};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Bytes per converted sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Sample converter producing interleaved `s16le` bytes.
pub struct SampleConverter;

impl SampleConverter {
    /// Bytes `buffer` occupies once converted.
    pub fn output_len(buffer: &AudioBufferRef<'_>) -> usize {
        buffer.frames() * buffer.spec().channels.count() * BYTES_PER_SAMPLE
    }

    /// Convert `buffer` into the front of `out`. Returns the bytes written.
    ///
    /// Fails if `out` cannot hold the whole buffer; a partial frame is never
    /// written.
    pub fn write_interleaved_s16le(buffer: &AudioBufferRef<'_>, out: &mut [u8]) -> Result<usize> {
        let needed = Self::output_len(buffer);
        if needed > out.len() {
            return Err(PlaybackError::DecoderFatal(format!(
                "decoded frame needs {} bytes, output slice holds {}",
                needed,
                out.len()
            )));
        }

        let out = &mut out[..needed];
        match buffer {
            AudioBufferRef::S16(buf) => Self::interleave(&**buf, out, |s: i16| s),
            AudioBufferRef::F32(buf) => Self::interleave(&**buf, out, |s: f32| s.into_sample()),
            AudioBufferRef::F64(buf) => Self::interleave(&**buf, out, |s: f64| s.into_sample()),
            AudioBufferRef::S32(buf) => Self::interleave(&**buf, out, |s: i32| s.into_sample()),
            AudioBufferRef::S24(buf) => Self::interleave(&**buf, out, |s| IntoSample::into_sample(s)),
            AudioBufferRef::S8(buf) => Self::interleave(&**buf, out, |s: i8| s.into_sample()),
            AudioBufferRef::U32(buf) => Self::interleave(&**buf, out, |s: u32| s.into_sample()),
            AudioBufferRef::U24(buf) => Self::interleave(&**buf, out, |s| IntoSample::into_sample(s)),
            AudioBufferRef::U16(buf) => Self::interleave(&**buf, out, |s: u16| s.into_sample()),
            AudioBufferRef::U8(buf) => Self::interleave(&**buf, out, |s: u8| s.into_sample()),
        }
        Ok(needed)
    }

    /// Interleave planes of `buf` into `out` (LRLR... for stereo).
    fn interleave<T>(buf: &AudioBuffer<T>, out: &mut [u8], convert: fn(T) -> i16)
    where
        T: Sample + Copy,
    {
        let channels = buf.spec().channels.count();
        for ch in 0..channels {
            let plane = buf.chan(ch);
            for (frame, &sample) in plane.iter().take(buf.frames()).enumerate() {
                let at = (frame * channels + ch) * BYTES_PER_SAMPLE;
                out[at..at + BYTES_PER_SAMPLE].copy_from_slice(&convert(sample).to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{AsAudioBufferRef, Channels, SignalSpec};

    fn stereo_spec() -> SignalSpec {
        SignalSpec::new(44_100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
    }

    #[test]
    fn test_s16_interleaving() {
        let mut buf = AudioBuffer::<i16>::new(4, stereo_spec());
        buf.render_reserved(Some(3));
        buf.chan_mut(0).copy_from_slice(&[1, 2, 3]);
        buf.chan_mut(1).copy_from_slice(&[-1, -2, -3]);

        let buffer = buf.as_audio_buffer_ref();
        assert_eq!(SampleConverter::output_len(&buffer), 12);

        let mut out = [0u8; 16];
        let written = SampleConverter::write_interleaved_s16le(&buffer, &mut out).unwrap();
        assert_eq!(written, 12);

        let samples: Vec<i16> = out[..written]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn test_f32_full_scale() {
        let mut buf = AudioBuffer::<f32>::new(2, stereo_spec());
        buf.render_reserved(Some(2));
        buf.chan_mut(0).copy_from_slice(&[0.0, -1.0]);
        buf.chan_mut(1).copy_from_slice(&[0.5, 0.0]);

        let mut out = [0u8; 8];
        SampleConverter::write_interleaved_s16le(&buf.as_audio_buffer_ref(), &mut out).unwrap();

        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[2], i16::MIN);
        assert!(samples[1] > 16_000 && samples[1] < 16_400);
    }

    #[test]
    fn test_output_too_small() {
        let mut buf = AudioBuffer::<i16>::new(4, stereo_spec());
        buf.render_reserved(Some(4));

        let mut out = [0u8; 15];
        let result = SampleConverter::write_interleaved_s16le(&buf.as_audio_buffer_ref(), &mut out);
        assert!(matches!(result, Err(PlaybackError::DecoderFatal(_))));
    }
}
