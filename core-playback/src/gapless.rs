//! # Gapless Trimming
//!
//! Removes encoder and decoder padding so consecutive gapless-tagged tracks
//! join without a seam.
//!
//! Sample indices below are in the *raw* timeline: the index of a sample in
//! the decoder's output counted from the start of the stream, including the
//! decoder's own delay. Encoder sample `n` appears at raw index
//! `decoder_delay_samples + n`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::output::OutputAccumulator;

/// Encoder delay/padding description for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GaplessInfo {
    /// First encoder sample that belongs to the track (encoder delay).
    pub first_sample_to_keep: u64,
    /// Last encoder sample that belongs to the track, inclusive. `None`
    /// disables trailing trim.
    pub last_sample_to_keep: Option<u64>,
    /// Decoder algorithmic delay. 0 means "ask the decoder".
    pub decoder_delay_samples: u64,
}

impl GaplessInfo {
    pub fn new(first_sample_to_keep: u64, last_sample_to_keep: Option<u64>) -> Self {
        Self {
            first_sample_to_keep,
            last_sample_to_keep,
            decoder_delay_samples: 0,
        }
    }

    /// Build from the encoder delay/padding pair stored by LAME-style tags.
    ///
    /// `total_samples` counts every encoded sample including delay and
    /// padding.
    pub fn from_encoder_padding(encoder_delay: u64, padding: u64, total_samples: u64) -> Self {
        let last = total_samples
            .checked_sub(padding + 1)
            .filter(|last| *last >= encoder_delay);
        Self::new(encoder_delay, last)
    }

    pub fn with_decoder_delay(mut self, samples: u64) -> Self {
        self.decoder_delay_samples = samples;
        self
    }

    /// Raw samples discarded before the first released sample.
    pub fn leading_trim_samples(&self) -> u64 {
        self.decoder_delay_samples + self.first_sample_to_keep
    }

    /// Raw index one past the last sample to release.
    pub fn raw_end(&self) -> Option<u64> {
        self.last_sample_to_keep
            .map(|last| self.decoder_delay_samples + last + 1)
    }

    /// Samples the listener hears, when the end is known.
    pub fn playable_samples(&self) -> Option<u64> {
        self.last_sample_to_keep
            .map(|last| (last + 1).saturating_sub(self.first_sample_to_keep))
    }

    /// Whether any trimming would happen.
    pub fn is_active(&self) -> bool {
        self.leading_trim_samples() > 0 || self.last_sample_to_keep.is_some()
    }
}

/// Applies [`GaplessInfo`] to the output accumulator.
///
/// Leading trim is pending from open until enough raw samples have been
/// decoded, possibly over many frames, then permanently inactive. Trailing
/// trim is armed while the end of the track may still be decoded and fires
/// once at end of input.
#[derive(Debug)]
pub struct GaplessTrimmer {
    info: Option<GaplessInfo>,
    block_align: usize,
    raw_samples: u64,
    leading_pending: bool,
    trailing_armed: bool,
    leading_trimmed: u64,
    trailing_trimmed: u64,
    /// Samples of whole frames decoded past the raw end and never buffered.
    dropped_past_end: u64,
}

impl GaplessTrimmer {
    pub fn new(info: Option<GaplessInfo>, block_align: usize) -> Self {
        let leading_pending = info.is_some_and(|i| i.leading_trim_samples() > 0);
        let trailing_armed = info.is_some_and(|i| i.last_sample_to_keep.is_some());
        Self {
            info,
            block_align: block_align.max(1),
            raw_samples: 0,
            leading_pending,
            trailing_armed,
            leading_trimmed: 0,
            trailing_trimmed: 0,
            dropped_past_end: 0,
        }
    }

    /// Pass-through trimmer.
    pub fn disabled(block_align: usize) -> Self {
        Self::new(None, block_align)
    }

    /// Account for `produced` bytes a decode just appended at `chunk_start`
    /// and drop any of them that fall inside the leading trim.
    ///
    /// A frame that starts at or after the raw end is dropped whole while
    /// trailing trim is armed; the frame crossing the raw end stays buffered
    /// for [`finish`](Self::finish).
    pub fn on_decoded(&mut self, out: &mut OutputAccumulator, chunk_start: usize, produced: usize) {
        let samples = (produced / self.block_align) as u64;
        let before = self.raw_samples;
        self.raw_samples += samples;

        if let Some(raw_end) = self.armed_raw_end() {
            if before >= raw_end && samples > 0 {
                out.remove_range(chunk_start, produced);
                self.dropped_past_end += samples;
                self.trailing_trimmed += samples;
                return;
            }
        }

        if !self.leading_pending {
            return;
        }
        let Some(info) = self.info else {
            return;
        };

        let threshold = info.leading_trim_samples();
        let drop = threshold.saturating_sub(before).min(samples);
        out.remove_range(chunk_start, drop as usize * self.block_align);
        self.leading_trimmed += drop;

        if self.raw_samples >= threshold {
            self.leading_pending = false;
            debug!(
                trimmed = self.leading_trimmed,
                raw_samples = self.raw_samples,
                "Leading trim complete"
            );
        }
    }

    /// PCM bytes that may be handed to the consumer now.
    ///
    /// While trailing trim is armed and input continues, `holdback` bytes
    /// stay buffered so the tail can still be cut. Samples at or past the
    /// raw end are never released while trailing trim is armed.
    pub fn releasable(&self, filled: usize, holdback: usize, input_done: bool) -> usize {
        let Some(raw_end) = self.armed_raw_end() else {
            return filled - filled % self.block_align;
        };

        let available = if input_done {
            filled
        } else {
            filled.saturating_sub(holdback)
        };
        let buffered = (filled / self.block_align) as u64;
        let buffer_start = self.buffered_end().saturating_sub(buffered);
        let allowed = raw_end.saturating_sub(buffer_start) as usize * self.block_align;

        let available = available.min(allowed);
        available - available % self.block_align
    }

    /// Apply end-of-input trimming. Called once input is exhausted and
    /// decoding has drained. Returns `true` if the whole track was trimmed.
    pub fn finish(&mut self, out: &mut OutputAccumulator) -> bool {
        if self.leading_pending {
            warn!(
                raw_samples = self.raw_samples,
                threshold = self.info.map(|i| i.leading_trim_samples()),
                "Stream ended inside leading trim"
            );
            self.leading_pending = false;
            out.clear();
            return true;
        }

        if !self.trailing_armed {
            return false;
        }
        self.trailing_armed = false;

        let Some(raw_end) = self.info.and_then(|i| i.raw_end()) else {
            return false;
        };
        let excess = self.buffered_end().saturating_sub(raw_end);
        let removed = out.truncate_tail(excess as usize * self.block_align);
        let removed_samples = (removed / self.block_align) as u64;
        self.trailing_trimmed += removed_samples;

        debug!(
            excess,
            removed = removed_samples,
            raw_samples = self.raw_samples,
            "Trailing trim applied"
        );
        false
    }

    /// Reset for a seek that lands on raw sample `raw_index`.
    ///
    /// A pending leading trim is abandoned and never re-armed; trailing trim
    /// is re-armed.
    pub fn on_seek(&mut self, raw_index: u64) {
        self.raw_samples = raw_index;
        self.dropped_past_end = 0;
        self.leading_pending = false;
        self.trailing_armed = self.info.is_some_and(|i| i.last_sample_to_keep.is_some());
    }

    /// `true` once every sample before the raw end has been decoded while
    /// trailing trim is armed. Nothing decoded after this point is released.
    pub fn reached_raw_end(&self) -> bool {
        self.armed_raw_end()
            .is_some_and(|raw_end| self.buffered_end() >= raw_end)
    }

    fn armed_raw_end(&self) -> Option<u64> {
        if !self.trailing_armed {
            return None;
        }
        self.info.and_then(|i| i.raw_end())
    }

    /// Raw index one past the last buffered sample.
    fn buffered_end(&self) -> u64 {
        self.raw_samples - self.dropped_past_end
    }

    pub fn info(&self) -> Option<GaplessInfo> {
        self.info
    }

    pub fn raw_samples(&self) -> u64 {
        self.raw_samples
    }

    pub fn is_leading_pending(&self) -> bool {
        self.leading_pending
    }

    pub fn is_trailing_armed(&self) -> bool {
        self.trailing_armed
    }

    pub fn leading_trimmed(&self) -> u64 {
        self.leading_trimmed
    }

    pub fn trailing_trimmed(&self) -> u64 {
        self.trailing_trimmed
    }
}
