//! # Frame Input Stage
//!
//! Holds the compressed-byte window the decoder reads from. The window is
//! refilled from the prefetch ring, handed to the [`FrameDecoder`] one frame
//! at a time, and compacted after every consumed frame or resync skip.

use tracing::{debug, trace, warn};

use crate::error::{PlaybackError, Result};
use crate::ring_buffer::PrefetchRingBuffer;
use crate::traits::{AudioFormat, DecodeOutcome, FrameDecoder, ProbeOutcome};

/// Outcome of one [`FrameInputStage::next_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// One frame was decoded into the output slice.
    Decoded {
        consumed: usize,
        produced: usize,
        /// Absolute source offset of the decoded frame.
        source_offset: u64,
    },
    /// The ring has no bytes right now; try again later.
    Starved,
    /// The source is finished and no further frame can be decoded.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct ProbeBudget {
    max_resyncs: usize,
    max_skipped: u64,
    resyncs: usize,
    skipped: u64,
}

impl ProbeBudget {
    fn charge(&mut self, skipped: usize) -> Result<()> {
        self.resyncs += 1;
        self.skipped += skipped as u64;
        if self.resyncs > self.max_resyncs {
            return Err(PlaybackError::InitializationFailure(format!(
                "no decodable frame after {} resync attempts",
                self.max_resyncs
            )));
        }
        self.charge_window(0)
    }

    fn charge_window(&mut self, dropped: usize) -> Result<()> {
        self.skipped += dropped as u64;
        if self.skipped > self.max_skipped {
            return Err(PlaybackError::InitializationFailure(format!(
                "no decodable frame in the first {} bytes",
                self.max_skipped
            )));
        }
        Ok(())
    }
}

/// Compressed input window between the prefetch ring and the decoder.
#[derive(Debug)]
pub struct FrameInputStage {
    window: Box<[u8]>,
    valid: usize,
    /// Absolute source offset of `window[0]`.
    window_offset: u64,
    max_tail_padding: usize,
    padded: bool,
    probe: Option<ProbeBudget>,
    resyncs: u64,
    resync_bytes: u64,
}

impl FrameInputStage {
    pub fn new(capacity: usize, max_tail_padding: usize, start_offset: u64) -> Self {
        Self {
            window: vec![0u8; capacity].into_boxed_slice(),
            valid: 0,
            window_offset: start_offset,
            max_tail_padding,
            padded: false,
            probe: None,
            resyncs: 0,
            resync_bytes: 0,
        }
    }

    /// Fail the stream if no frame decodes within `max_resyncs` consecutive
    /// resyncs or `window_bytes` skipped bytes. Disarmed by the first
    /// decoded frame.
    pub fn arm_probe(&mut self, max_resyncs: usize, window_bytes: u64) {
        self.probe = Some(ProbeBudget {
            max_resyncs,
            max_skipped: window_bytes,
            resyncs: 0,
            skipped: 0,
        });
    }

    pub fn is_probing(&self) -> bool {
        self.probe.is_some()
    }

    /// Drop all buffered input and continue at source offset `offset`.
    pub fn reset(&mut self, offset: u64) {
        self.valid = 0;
        self.window_offset = offset;
        self.padded = false;
    }

    /// Ask the decoder for the stream format.
    ///
    /// Returns `Ok(None)` while the ring is still filling. A full window the
    /// decoder cannot identify is halved and charged against the probe
    /// budget.
    pub fn probe_format(
        &mut self,
        ring: &mut PrefetchRingBuffer,
        decoder: &mut dyn FrameDecoder,
    ) -> Result<Option<AudioFormat>> {
        loop {
            self.refill(ring);

            if self.valid > 0 {
                if let ProbeOutcome::Format(format) =
                    decoder.probe_format(&self.window[..self.valid])
                {
                    if !format.is_valid() {
                        return Err(PlaybackError::InitializationFailure(format!(
                            "decoder reported an unusable format: {:?}",
                            format
                        )));
                    }
                    return Ok(Some(format));
                }
            }

            if self.valid == self.window.len() {
                let dropped = self.valid / 2;
                if let Some(probe) = self.probe.as_mut() {
                    probe.charge_window(dropped)?;
                }
                self.discard(dropped);
                self.resync_bytes += dropped as u64;
                continue;
            }

            if ring.is_exhausted() {
                return Err(PlaybackError::InitializationFailure(
                    "stream ended before its format could be determined".to_string(),
                ));
            }
            return Ok(None);
        }
    }

    /// Decode the next frame into `out`.
    pub fn next_frame(
        &mut self,
        ring: &mut PrefetchRingBuffer,
        decoder: &mut dyn FrameDecoder,
        out: &mut [u8],
    ) -> Result<FrameEvent> {
        loop {
            self.refill(ring);

            if self.valid == 0 {
                if ring.is_exhausted() {
                    self.padded = true;
                    return Ok(FrameEvent::Exhausted);
                }
                return Ok(FrameEvent::Starved);
            }

            match decoder.decode_next(&self.window[..self.valid], out) {
                DecodeOutcome::Decoded { consumed, produced } => {
                    if consumed > self.valid || produced > out.len() {
                        return Err(PlaybackError::DecoderFatal(format!(
                            "decoder reported consumed={} of {} and produced={} of {}",
                            consumed,
                            self.valid,
                            produced,
                            out.len()
                        )));
                    }
                    if consumed == 0 && produced == 0 {
                        return Err(PlaybackError::DecoderFatal(
                            "decoder made no progress".to_string(),
                        ));
                    }

                    let source_offset = self.window_offset;
                    self.discard(consumed);
                    if self.probe.take().is_some() {
                        debug!(source_offset, "First frame decoded, probe budget released");
                    }
                    trace!(consumed, produced, source_offset, "Frame decoded");
                    return Ok(FrameEvent::Decoded {
                        consumed,
                        produced,
                        source_offset,
                    });
                }
                DecodeOutcome::Resync { skip } => {
                    let skip = skip.max(1).min(self.valid);
                    let offset = self.window_offset;
                    self.discard(skip);
                    self.resyncs += 1;
                    self.resync_bytes += skip as u64;

                    match self.probe.as_mut() {
                        Some(probe) => {
                            probe.charge(skip)?;
                            trace!(offset, skip, "Resync while probing");
                        }
                        None => warn!(offset, skip, "Lost frame sync, resyncing"),
                    }
                }
                DecodeOutcome::NeedMoreInput => {
                    if self.valid == self.window.len() {
                        return Err(PlaybackError::BufferExhaustion(format!(
                            "frame at offset {} does not fit the {} byte input window",
                            self.window_offset,
                            self.window.len()
                        )));
                    }
                    if !ring.is_exhausted() {
                        return Ok(FrameEvent::Starved);
                    }
                    if !self.padded {
                        self.padded = true;
                        let pad = decoder
                            .lookahead_bytes()
                            .min(self.max_tail_padding)
                            .min(self.window.len() - self.valid);
                        if pad > 0 {
                            self.window[self.valid..self.valid + pad].fill(0);
                            self.valid += pad;
                            debug!(pad, "Appended tail padding for the final frame");
                            continue;
                        }
                    }

                    debug!(
                        leftover = self.valid,
                        offset = self.window_offset,
                        "Dropping incomplete trailing frame"
                    );
                    self.discard(self.valid);
                    return Ok(FrameEvent::Exhausted);
                }
                DecodeOutcome::Fatal(message) => {
                    return Err(PlaybackError::DecoderFatal(message));
                }
            }
        }
    }

    /// Absolute source offset of the next unconsumed byte.
    pub fn consumed_offset(&self) -> u64 {
        self.window_offset
    }

    /// Bytes buffered in the window.
    pub fn buffered(&self) -> usize {
        self.valid
    }

    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn resync_bytes(&self) -> u64 {
        self.resync_bytes
    }

    fn refill(&mut self, ring: &mut PrefetchRingBuffer) {
        if self.valid < self.window.len() {
            self.valid += ring.read(&mut self.window[self.valid..]);
        }
    }

    fn discard(&mut self, n: usize) {
        let n = n.min(self.valid);
        self.window.copy_within(n..self.valid, 0);
        self.valid -= n;
        self.window_offset += n as u64;
    }
}
