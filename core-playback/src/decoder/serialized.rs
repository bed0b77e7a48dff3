//! Serialized access to decoders built on non-reentrant libraries.
//!
//! Some codec libraries keep global tables or scratch state, so two
//! instances must never decode at the same time. Every instance created for
//! such a library shares one [`DecoderLock`]; unrelated libraries use their
//! own locks and run in parallel.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::traits::{AudioCodec, DecodeOutcome, FrameDecoder, ProbeOutcome};

/// Lock shared by all decoders of one library.
#[derive(Debug, Clone, Default)]
pub struct DecoderLock(Arc<Mutex<()>>);

impl DecoderLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decoders holding this lock handle.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

/// [`FrameDecoder`] wrapper that takes a shared lock around every call into
/// the wrapped decoder that may touch library state.
pub struct SerializedDecoder<D> {
    inner: D,
    lock: DecoderLock,
}

impl<D: FrameDecoder> SerializedDecoder<D> {
    pub fn new(inner: D, lock: DecoderLock) -> Self {
        Self { inner, lock }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: FrameDecoder> FrameDecoder for SerializedDecoder<D> {
    fn codec(&self) -> AudioCodec {
        self.inner.codec()
    }

    fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome {
        let _guard = self.lock.0.lock();
        self.inner.probe_format(input)
    }

    fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome {
        let _guard = self.lock.0.lock();
        self.inner.decode_next(input, output)
    }

    fn flush(&mut self) {
        let _guard = self.lock.0.lock();
        self.inner.flush()
    }

    fn max_frame_bytes(&self) -> usize {
        self.inner.max_frame_bytes()
    }

    fn lookahead_bytes(&self) -> usize {
        self.inner.lookahead_bytes()
    }

    fn decoder_delay_samples(&self) -> u64 {
        self.inner.decoder_delay_samples()
    }
}
