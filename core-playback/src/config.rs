//! # Engine Configuration
//!
//! Buffer sizing, probe limits and prefetch pacing for the streaming decode
//! engine, plus the engine state machine and counters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decode engine configuration.
///
/// All buffers are allocated once at `init` and never grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the prefetch ring buffer in bytes.
    ///
    /// Default: 256 KB (~6.5 s of 320 kbps MP3).
    #[serde(default = "default_ring_capacity_bytes")]
    pub ring_capacity_bytes: usize,

    /// Size of each read issued against the byte source by the prefetch
    /// thread.
    ///
    /// Default: 16 KB.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,

    /// Capacity of the compressed input window handed to the frame decoder.
    /// Must hold at least one complete compressed frame.
    ///
    /// Default: 32 KB.
    #[serde(default = "default_input_capacity_bytes")]
    pub input_capacity_bytes: usize,

    /// Capacity of the decoded PCM accumulator.
    ///
    /// Must hold at least one maximum decoded frame. Up to one more frame
    /// is held back for trailing trim when there is room for it.
    ///
    /// Default: 64 KB.
    #[serde(default = "default_output_capacity_bytes")]
    pub output_capacity_bytes: usize,

    /// Upper bound for the zero padding appended once at end of source.
    /// The decoder's own look-ahead request is clamped to this.
    ///
    /// Default: 64 bytes.
    #[serde(default = "default_max_tail_padding_bytes")]
    pub max_tail_padding_bytes: usize,

    /// Consecutive `Resync` results tolerated before the first decoded frame.
    ///
    /// Default: 16384.
    #[serde(default = "default_max_probe_resyncs")]
    pub max_probe_resyncs: usize,

    /// Bytes that may be skipped before the first decoded frame.
    ///
    /// Default: 512 KB.
    #[serde(default = "default_probe_window_bytes")]
    pub probe_window_bytes: u64,

    /// How long the prefetch thread parks when the ring is full or the
    /// source is exhausted before re-checking for a stop request.
    ///
    /// Default: 20 ms.
    #[serde(default = "default_prefetch_idle_wait")]
    pub prefetch_idle_wait: Duration,

    /// How long `init` waits for the prefetch thread between probe attempts.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_probe_poll_interval")]
    pub probe_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity_bytes: default_ring_capacity_bytes(),
            read_chunk_bytes: default_read_chunk_bytes(),
            input_capacity_bytes: default_input_capacity_bytes(),
            output_capacity_bytes: default_output_capacity_bytes(),
            max_tail_padding_bytes: default_max_tail_padding_bytes(),
            max_probe_resyncs: default_max_probe_resyncs(),
            probe_window_bytes: default_probe_window_bytes(),
            prefetch_idle_wait: default_prefetch_idle_wait(),
            probe_poll_interval: default_probe_poll_interval(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration for local files.
    ///
    /// - Smaller ring (disk latency is low)
    /// - Larger reads
    pub fn local_file() -> Self {
        Self {
            ring_capacity_bytes: 128 * 1024,
            read_chunk_bytes: 32 * 1024,
            ..Default::default()
        }
    }

    /// Create a configuration for network streams.
    ///
    /// - 1 MB ring to ride out stalls
    /// - Larger reads to amortize request overhead
    /// - Wider probe window (servers often prepend large ID3 tags)
    pub fn network() -> Self {
        Self {
            ring_capacity_bytes: 1024 * 1024,
            read_chunk_bytes: 64 * 1024,
            probe_window_bytes: 2 * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    ///
    /// Format dependent checks (output capacity against the decoder's
    /// maximum frame size) happen at `init`.
    pub fn validate(&self) -> Result<(), String> {
        if self.ring_capacity_bytes == 0 {
            return Err("ring_capacity_bytes must be > 0".to_string());
        }

        if self.read_chunk_bytes == 0 {
            return Err("read_chunk_bytes must be > 0".to_string());
        }

        if self.read_chunk_bytes > self.ring_capacity_bytes {
            return Err("read_chunk_bytes cannot exceed ring_capacity_bytes".to_string());
        }

        if self.input_capacity_bytes < MIN_INPUT_CAPACITY_BYTES {
            return Err(format!(
                "input_capacity_bytes must be >= {}",
                MIN_INPUT_CAPACITY_BYTES
            ));
        }

        if self.output_capacity_bytes == 0 {
            return Err("output_capacity_bytes must be > 0".to_string());
        }

        if self.max_tail_padding_bytes >= self.input_capacity_bytes {
            return Err("max_tail_padding_bytes must be smaller than input_capacity_bytes".to_string());
        }

        if self.max_probe_resyncs == 0 {
            return Err("max_probe_resyncs must be > 0".to_string());
        }

        if self.probe_window_bytes == 0 {
            return Err("probe_window_bytes must be > 0".to_string());
        }

        if self.prefetch_idle_wait.is_zero() {
            return Err("prefetch_idle_wait must be non-zero".to_string());
        }

        Ok(())
    }
}

/// Smallest input window that can hold any MPEG audio frame (2881 bytes)
/// with room to spare.
pub const MIN_INPUT_CAPACITY_BYTES: usize = 4096;

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_ring_capacity_bytes() -> usize {
    256 * 1024
}

fn default_read_chunk_bytes() -> usize {
    16 * 1024
}

fn default_input_capacity_bytes() -> usize {
    32 * 1024
}

fn default_output_capacity_bytes() -> usize {
    64 * 1024
}

fn default_max_tail_padding_bytes() -> usize {
    64
}

fn default_max_probe_resyncs() -> usize {
    16384
}

fn default_probe_window_bytes() -> u64 {
    512 * 1024
}

fn default_prefetch_idle_wait() -> Duration {
    Duration::from_millis(20)
}

fn default_probe_poll_interval() -> Duration {
    Duration::from_millis(10)
}

// ============================================================================
// Engine State
// ============================================================================

/// Lifecycle state of the decode engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No track open.
    Closed,
    /// Acquiring the byte source and starting the prefetch thread.
    Opening,
    /// Decoding the first frames to learn the stream format.
    Probing,
    /// Open, nothing decoded since the last open or seek.
    Ready,
    /// Serving PCM.
    Decoding,
    /// Flushing buffers for a seek.
    Seeking,
    /// Input exhausted; releasing the remaining PCM.
    Draining,
}

impl EngineState {
    /// Returns `true` if `read_pcm` may be called.
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Ready | Self::Decoding | Self::Draining)
    }

    /// Returns `true` if `seek` may be called.
    pub fn can_seek(&self) -> bool {
        matches!(self, Self::Ready | Self::Decoding | Self::Draining)
    }

    /// Returns `true` while `init` is running.
    pub fn is_opening(&self) -> bool {
        matches!(self, Self::Opening | Self::Probing)
    }
}

/// Counters describing decode behavior for the open track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Frames that produced PCM or were consumed as metadata frames.
    pub frames_decoded: u64,
    /// Bytes skipped through `Resync`.
    pub resync_bytes: u64,
    /// Number of `Resync` results.
    pub resyncs: u64,
    /// Decode attempts deferred because the accumulator lacked room for a
    /// full frame.
    pub output_deferrals: u64,
    /// `read_pcm` calls that found the prefetch ring empty.
    pub input_starvations: u64,
    /// PCM bytes handed to the consumer.
    pub bytes_emitted: u64,
    /// Samples removed by leading trim.
    pub leading_trimmed_samples: u64,
    /// Samples removed by trailing trim.
    pub trailing_trimmed_samples: u64,
    /// Completed seeks.
    pub seeks: u64,
}

impl EngineStats {
    /// Fraction of decode attempts that were deferred by backpressure.
    pub fn deferral_ratio(&self) -> f64 {
        let attempts = self.frames_decoded + self.output_deferrals;
        if attempts == 0 {
            return 0.0;
        }
        self.output_deferrals as f64 / attempts as f64
    }
}
