//! # VBR Seek Table
//!
//! Maps a fraction of the track duration to a byte offset and back for
//! streams whose bitrate varies. Entries are `(fraction, offset)` pairs with
//! both coordinates non-decreasing; lookups bracket and interpolate
//! linearly, and a lookup that hits a node exactly returns that node.

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// One seek table node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekTableEntry {
    /// Position as a fraction of the total duration, `0.0..=1.0`.
    pub fraction: f64,
    /// Absolute byte offset in the source.
    pub offset: u64,
}

impl SeekTableEntry {
    pub fn new(fraction: f64, offset: u64) -> Self {
        Self { fraction, offset }
    }
}

/// Immutable time/offset table. Rebuilt, never edited, when better
/// information arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct VbrSeekTable {
    entries: Vec<SeekTableEntry>,
    stream_start: u64,
    estimated: bool,
}

impl VbrSeekTable {
    /// A table with no entries. Both lookups return the stream start.
    pub fn empty(stream_start: u64) -> Self {
        Self {
            entries: Vec::new(),
            stream_start,
            estimated: false,
        }
    }

    /// Build from explicit entries, validating their order.
    pub fn from_entries(stream_start: u64, entries: Vec<SeekTableEntry>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            if !entry.fraction.is_finite() || !(0.0..=1.0).contains(&entry.fraction) {
                return Err(PlaybackError::InvalidSeekTable(format!(
                    "entry {} has fraction {} outside [0, 1]",
                    i, entry.fraction
                )));
            }
        }

        for (i, pair) in entries.windows(2).enumerate() {
            if pair[1].fraction < pair[0].fraction || pair[1].offset < pair[0].offset {
                return Err(PlaybackError::InvalidSeekTable(format!(
                    "entry {} ({}, {}) precedes entry {} ({}, {})",
                    i + 1,
                    pair[1].fraction,
                    pair[1].offset,
                    i,
                    pair[0].fraction,
                    pair[0].offset
                )));
            }
        }

        Ok(Self {
            entries,
            stream_start,
            estimated: false,
        })
    }

    /// Build from a Xing/Info 100-entry TOC.
    ///
    /// `toc[i]` is the byte position of `i`% of the duration, scaled to
    /// `0..=255` of `stream_bytes`. Out-of-order TOC bytes (seen in some
    /// encoders) are clamped to keep the table monotonic.
    pub fn from_xing_toc(toc: &[u8; 100], first_frame: u64, stream_bytes: u64) -> Self {
        let mut entries = Vec::with_capacity(101);
        let mut last_offset = first_frame;

        for (i, &byte) in toc.iter().enumerate() {
            let offset = (first_frame + byte as u64 * stream_bytes / 256).max(last_offset);
            entries.push(SeekTableEntry::new(i as f64 / 100.0, offset));
            last_offset = offset;
        }
        entries.push(SeekTableEntry::new(
            1.0,
            (first_frame + stream_bytes).max(last_offset),
        ));

        Self {
            entries,
            stream_start: first_frame,
            estimated: false,
        }
    }

    /// Build from a VBRI table of per-segment byte sizes, each segment
    /// spanning `frames_per_entry` frames.
    pub fn from_vbri(
        first_frame: u64,
        stream_bytes: u64,
        segment_bytes: &[u64],
        frames_per_entry: u64,
        total_frames: u64,
    ) -> Self {
        if total_frames == 0 || frames_per_entry == 0 {
            return Self::empty(first_frame);
        }

        let mut entries = Vec::with_capacity(segment_bytes.len() + 2);
        entries.push(SeekTableEntry::new(0.0, first_frame));

        let mut offset = first_frame;
        for (i, size) in segment_bytes.iter().enumerate() {
            let frames = (i as u64 + 1) * frames_per_entry;
            if frames >= total_frames {
                break;
            }
            offset += size;
            entries.push(SeekTableEntry::new(
                frames as f64 / total_frames as f64,
                offset,
            ));
        }
        entries.push(SeekTableEntry::new(
            1.0,
            (first_frame + stream_bytes).max(offset),
        ));

        Self {
            entries,
            stream_start: first_frame,
            estimated: false,
        }
    }

    /// Two-point constant bitrate estimate between `start` and `end`.
    pub fn constant_bitrate(start: u64, end: u64) -> Self {
        Self {
            entries: vec![
                SeekTableEntry::new(0.0, start),
                SeekTableEntry::new(1.0, end.max(start)),
            ],
            stream_start: start,
            estimated: true,
        }
    }

    /// Replacement table for an estimate once the true end offset is known.
    ///
    /// Returns `None` for tables that came from stream metadata.
    pub fn refined(&self, end: u64) -> Option<Self> {
        if !self.estimated {
            return None;
        }
        let mut table = Self::constant_bitrate(self.stream_start, end);
        table.estimated = false;
        Some(table)
    }

    /// Byte offset for a position given as a fraction of the duration.
    pub fn time_to_offset(&self, fraction: f64) -> u64 {
        let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) else {
            return self.stream_start;
        };

        // NaN falls through to the first entry as well.
        if !(fraction > first.fraction) {
            return first.offset;
        }
        if fraction >= last.fraction {
            return last.offset;
        }

        let idx = self.entries.partition_point(|e| e.fraction < fraction);
        let hi = self.entries[idx];
        if hi.fraction == fraction {
            return hi.offset;
        }
        let lo = self.entries[idx - 1];

        let t = (fraction - lo.fraction) / (hi.fraction - lo.fraction);
        lo.offset + (t * (hi.offset - lo.offset) as f64) as u64
    }

    /// Fraction of the duration at byte offset `offset`.
    pub fn offset_to_fraction(&self, offset: u64) -> f64 {
        let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) else {
            return 0.0;
        };

        if offset <= first.offset {
            return first.fraction;
        }
        if offset >= last.offset {
            return last.fraction;
        }

        let idx = self.entries.partition_point(|e| e.offset < offset);
        let hi = self.entries[idx];
        if hi.offset == offset {
            return hi.fraction;
        }
        let lo = self.entries[idx - 1];

        let t = (offset - lo.offset) as f64 / (hi.offset - lo.offset) as f64;
        lo.fraction + t * (hi.fraction - lo.fraction)
    }

    /// Playback time at byte offset `offset` for a track of `duration_ms`.
    pub fn offset_to_time(&self, offset: u64, duration_ms: u64) -> u64 {
        (self.offset_to_fraction(offset) * duration_ms as f64) as u64
    }

    /// Byte offset of playback time `time_ms` for a track of `duration_ms`.
    pub fn time_ms_to_offset(&self, time_ms: u64, duration_ms: u64) -> u64 {
        if duration_ms == 0 {
            return self.time_to_offset(0.0);
        }
        self.time_to_offset(time_ms as f64 / duration_ms as f64)
    }

    pub fn entries(&self) -> &[SeekTableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` for constant bitrate guesses that should be refined.
    pub fn is_estimated(&self) -> bool {
        self.estimated
    }

    pub fn stream_start(&self) -> u64 {
        self.stream_start
    }

    /// Offset of the last entry, or the stream start when empty.
    pub fn stream_end(&self) -> u64 {
        self.entries
            .last()
            .map_or(self.stream_start, |entry| entry.offset)
    }
}
