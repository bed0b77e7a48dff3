//! # Streaming Decode Engine
//!
//! Turns a [`ByteSource`] and a [`FrameDecoder`] into a pull-based PCM
//! stream with sample-accurate gapless trimming and time-based seeking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  prefetch thread  ┌─────────────────────┐
//! │  ByteSource  │ ────────────────▶ │ PrefetchRingBuffer  │
//! └──────────────┘                   └──────────┬──────────┘
//!                                               │ compressed bytes
//!                                               ▼
//!                                    ┌─────────────────────┐
//!                                    │  FrameInputStage    │ ── FrameDecoder
//!                                    └──────────┬──────────┘
//!                                               │ PCM
//!                                               ▼
//!                                    ┌─────────────────────┐
//!                                    │ OutputAccumulator + │
//!                                    │  GaplessTrimmer     │
//!                                    └──────────┬──────────┘
//!                                               │ read_pcm
//!                                               ▼
//!                                            caller
//! ```
//!
//! Only the prefetch thread touches the source. Every other stage runs on
//! the caller's thread inside `init`, `read_pcm` and `seek`, and `read_pcm`
//! never waits for I/O: an empty ring yields [`PcmRead::Pending`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::{EngineConfig, PcmRead, StreamingDecodeEngine};
//! # use bridge_traits::source::MemorySource;
//! # fn demo(decoder: Box<dyn core_playback::FrameDecoder>) -> core_playback::Result<()> {
//! let mut engine = StreamingDecodeEngine::new(EngineConfig::local_file());
//! let info = engine.init(Box::new(MemorySource::new(vec![0u8; 16])), decoder, None)?;
//!
//! let mut pcm = vec![0u8; 4096];
//! loop {
//!     match engine.read_pcm(&mut pcm)? {
//!         PcmRead::Data(n) => { /* play pcm[..n] */ }
//!         PcmRead::Pending => std::thread::sleep(std::time::Duration::from_millis(5)),
//!         PcmRead::EndOfStream => break,
//!     }
//! }
//! engine.deinit();
//! # Ok(())
//! # }
//! ```

use bridge_traits::source::ByteSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{EngineConfig, EngineState, EngineStats};
use crate::error::{PlaybackError, Result};
use crate::gapless::GaplessTrimmer;
use crate::input::{FrameEvent, FrameInputStage};
use crate::output::OutputAccumulator;
use crate::ring_buffer::{PrefetchOptions, PrefetchRingBuffer};
use crate::seek_table::VbrSeekTable;
use crate::traits::{AudioFormat, FrameDecoder, PcmRead, SeekMetadataProvider, StreamInfo};

/// Playback position reported by [`StreamingDecodeEngine::position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackPosition {
    /// Samples per channel released since the start of the track.
    pub samples: u64,
    pub position_ms: u64,
    /// 0 when unknown.
    pub duration_ms: u64,
    /// Source offset up to which the decoder has consumed input.
    pub bytes_consumed: u64,
    /// No more input will be decoded before the next seek.
    pub end_of_source: bool,
    /// A read has started decoding and input remains.
    pub decoding_in_progress: bool,
}

impl PlaybackPosition {
    /// Fraction played (0.0 - 1.0); 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.position_ms as f64 / self.duration_ms as f64).min(1.0)
    }
}

/// Result of one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Decoded,
    /// The accumulator cannot take another full frame.
    OutputFull,
    Starved,
    InputExhausted,
}

/// Everything owned by an open track.
struct ActiveStream {
    ring: PrefetchRingBuffer,
    input: FrameInputStage,
    output: OutputAccumulator,
    decoder: Box<dyn FrameDecoder>,
    trimmer: GaplessTrimmer,
    table: VbrSeekTable,
    info: StreamInfo,
    description: String,
    audio_start: u64,
    max_frame_bytes: usize,
    holdback: usize,
    /// Decoder output for the whole stream in samples per channel; the
    /// seek table's fractions are fractions of this.
    raw_total_samples: u64,
    input_done: bool,
    /// Input stopped at the gapless end rather than at end of source.
    stopped_at_raw_end: bool,
    tail_trimmed: bool,
    seeked: bool,
    /// The raw counter is re-based on the first frame decoded after a seek.
    rebase_pending: bool,
    position_samples: u64,
    last_frame_offset: u64,
    /// Source offset one past the last decoded frame.
    frames_end: u64,
}

impl ActiveStream {
    fn format(&self) -> &AudioFormat {
        &self.info.format
    }

    fn position_ms(&self) -> u64 {
        self.format().samples_to_ms(self.position_samples)
    }

    fn leading_trim_samples(&self) -> u64 {
        self.info.gapless.map_or(0, |g| g.leading_trim_samples())
    }

    /// Raw sample index of source offset `offset` according to the table.
    fn raw_index_at(&self, offset: u64) -> u64 {
        (self.table.offset_to_fraction(offset) * self.raw_total_samples as f64).round() as u64
    }

    /// Decode at most one frame into the accumulator.
    fn decode_step(&mut self, stats: &mut EngineStats) -> Result<StepOutcome> {
        if !self.output.has_room_for(self.max_frame_bytes) {
            return Ok(StepOutcome::OutputFull);
        }

        let chunk_start = self.output.len();
        let event = self.input.next_frame(
            &mut self.ring,
            &mut *self.decoder,
            self.output.spare_mut(),
        )?;

        match event {
            FrameEvent::Decoded {
                consumed,
                produced,
                source_offset,
            } => {
                if !self.output.commit(produced) {
                    return Err(PlaybackError::BufferExhaustion(format!(
                        "decoded frame of {} bytes overflows the output accumulator",
                        produced
                    )));
                }
                if self.rebase_pending {
                    self.rebase_pending = false;
                    let raw = self.raw_index_at(source_offset);
                    self.trimmer.on_seek(raw);
                    self.position_samples = raw.saturating_sub(self.leading_trim_samples());
                }
                self.trimmer
                    .on_decoded(&mut self.output, chunk_start, produced);
                self.last_frame_offset = source_offset;
                self.frames_end = source_offset + consumed as u64;
                stats.frames_decoded += 1;
                Ok(StepOutcome::Decoded)
            }
            FrameEvent::Starved => Ok(StepOutcome::Starved),
            FrameEvent::Exhausted => Ok(StepOutcome::InputExhausted),
        }
    }

    /// End-of-input bookkeeping: trailing trim and, when the source itself
    /// ran out, seek table refinement.
    fn finish_input(&mut self, source_exhausted: bool) {
        self.input_done = true;
        self.stopped_at_raw_end = !source_exhausted;
        if self.tail_trimmed {
            return;
        }
        self.tail_trimmed = true;

        if self.trimmer.finish(&mut self.output) {
            warn!(
                source = %self.description,
                "Gapless trim covers the whole stream, nothing to play"
            );
        }

        if !source_exhausted || self.ring.read_error().is_some() {
            return;
        }

        if !self.seeked {
            self.raw_total_samples = self.trimmer.raw_samples();
        }

        let end = self.frames_end;
        if self.table.is_estimated() || self.table.is_empty() {
            let refined = VbrSeekTable::constant_bitrate(self.audio_start, end).refined(end);
            if let Some(table) = refined {
                debug!(audio_start = self.audio_start, end, "Seek table refined at end of stream");
                self.table = table;
            }
        }

        // After a seek the released count no longer covers the whole track.
        if self.info.total_time_ms == 0 && !self.seeked {
            let released = self.position_samples + self.format().bytes_to_samples(self.output.len());
            self.info.total_time_ms = self.format().samples_to_ms(released);
            debug!(total_ms = self.info.total_time_ms, "Duration learned at end of stream");
        }
        self.info.seekable = !self.table.is_empty() && self.info.total_time_ms > 0;
    }
}

/// Pull-based streaming decoder for one track at a time.
///
/// The engine is driven from a single thread; internally it owns one
/// prefetch thread per open track.
pub struct StreamingDecodeEngine {
    config: EngineConfig,
    state: EngineState,
    stats: EngineStats,
    stream: Option<ActiveStream>,
}

impl StreamingDecodeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::Closed,
            stats: EngineStats::default(),
            stream: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open a track.
    ///
    /// Starts the prefetch thread, probes the stream format and decodes up
    /// to the first PCM-producing frame. On failure the engine is left
    /// `Closed` with the prefetch thread stopped.
    ///
    /// # Errors
    ///
    /// - `InvalidState` - a track is already open
    /// - `InvalidConfig` - configuration failed validation
    /// - `InitializationFailure` - no decodable frame in the probe window
    /// - `BufferExhaustion` - output capacity below one decoded frame
    #[instrument(skip_all, fields(source = %source.description()))]
    pub fn init(
        &mut self,
        source: Box<dyn ByteSource>,
        decoder: Box<dyn FrameDecoder>,
        metadata: Option<&dyn SeekMetadataProvider>,
    ) -> Result<StreamInfo> {
        if self.state != EngineState::Closed {
            return Err(PlaybackError::InvalidState(self.state));
        }
        self.config
            .validate()
            .map_err(PlaybackError::InvalidConfig)?;

        self.state = EngineState::Opening;
        self.stats = EngineStats::default();

        match self.open(source, decoder, metadata) {
            Ok(stream) => {
                let info = stream.info.clone();
                info!(
                    codec = ?info.format.codec,
                    sample_rate = info.format.sample_rate,
                    channels = info.format.channels,
                    total_ms = info.total_time_ms,
                    seekable = info.seekable,
                    gapless = info.gapless.is_some(),
                    "Track opened"
                );
                self.stream = Some(stream);
                self.state = EngineState::Ready;
                Ok(info)
            }
            Err(e) => {
                error!(error = %e, "Failed to open track");
                self.state = EngineState::Closed;
                Err(e)
            }
        }
    }

    fn open(
        &mut self,
        source: Box<dyn ByteSource>,
        mut decoder: Box<dyn FrameDecoder>,
        metadata: Option<&dyn SeekMetadataProvider>,
    ) -> Result<ActiveStream> {
        let description = source.description();
        let length = source.length();
        let audio_start = metadata.map_or(0, |m| m.audio_start());
        let audio_end = metadata
            .and_then(|m| m.audio_end())
            .or(length)
            .filter(|end| *end > audio_start);

        debug!(?length, audio_start, ?audio_end, "Opening byte source");

        let mut ring = PrefetchRingBuffer::start(
            source,
            PrefetchOptions::from(&self.config),
            audio_start,
        )?;
        let mut input = FrameInputStage::new(
            self.config.input_capacity_bytes,
            self.config.max_tail_padding_bytes,
            audio_start,
        );
        input.arm_probe(self.config.max_probe_resyncs, self.config.probe_window_bytes);

        // Probing
        self.state = EngineState::Probing;
        let format = loop {
            match input.probe_format(&mut ring, &mut *decoder) {
                Ok(Some(format)) => break format,
                Ok(None) => ring.wait_for_data(self.config.probe_poll_interval),
                Err(e) => return Err(Self::probe_error(e, &ring)),
            }
        };
        debug!(?format, "Stream format probed");

        let max_frame_bytes = decoder.max_frame_bytes();
        let capacity = self.config.output_capacity_bytes;
        if capacity < max_frame_bytes {
            return Err(PlaybackError::BufferExhaustion(format!(
                "output capacity {} is below one decoded frame ({} bytes)",
                capacity, max_frame_bytes
            )));
        }
        // Up to one frame stays buffered for the trailing trim, never so
        // much that no frame fits next to it.
        let holdback = max_frame_bytes.min(capacity - max_frame_bytes);

        let gapless = metadata.and_then(|m| m.gapless_info()).map(|g| {
            if g.decoder_delay_samples == 0 {
                g.with_decoder_delay(decoder.decoder_delay_samples())
            } else {
                g
            }
        });

        let mut stream = ActiveStream {
            ring,
            input,
            output: OutputAccumulator::new(capacity),
            decoder,
            trimmer: GaplessTrimmer::new(gapless, format.block_align()),
            table: VbrSeekTable::empty(audio_start),
            info: StreamInfo {
                format,
                total_time_ms: 0,
                seekable: false,
                gapless,
            },
            description,
            audio_start,
            max_frame_bytes,
            holdback,
            raw_total_samples: 0,
            input_done: false,
            stopped_at_raw_end: false,
            tail_trimmed: false,
            seeked: false,
            rebase_pending: false,
            position_samples: 0,
            last_frame_offset: audio_start,
            frames_end: audio_start,
        };

        // Decode up to the first frame that produces PCM.
        let (first_bytes, first_samples) = loop {
            let before = stream.trimmer.raw_samples();
            match stream.decode_step(&mut self.stats) {
                Ok(StepOutcome::Decoded) => {
                    let samples = stream.trimmer.raw_samples() - before;
                    if samples > 0 {
                        break (stream.frames_end - stream.last_frame_offset, samples);
                    }
                }
                Ok(StepOutcome::Starved) => {
                    stream.ring.wait_for_data(self.config.probe_poll_interval)
                }
                Ok(StepOutcome::InputExhausted) => {
                    let cause = match stream.ring.read_error() {
                        Some(failure) => format!(
                            "source failed at byte {} before audio was found: {}",
                            failure.offset, failure.message
                        ),
                        None => "stream ended before any audio frame".to_string(),
                    };
                    return Err(PlaybackError::InitializationFailure(cause));
                }
                Ok(StepOutcome::OutputFull) => {
                    return Err(PlaybackError::BufferExhaustion(
                        "output accumulator full before the first frame".to_string(),
                    ));
                }
                Err(e) => return Err(Self::probe_error(e, &stream.ring)),
            }
        };

        stream.table = match metadata.and_then(|m| m.seek_points()) {
            Some(points) if !points.is_empty() => VbrSeekTable::from_entries(audio_start, points)?,
            _ => match audio_end {
                Some(end) => VbrSeekTable::constant_bitrate(audio_start, end),
                None => VbrSeekTable::empty(audio_start),
            },
        };

        let total_time_ms = if let Some(ms) = metadata.and_then(|m| m.duration_ms()) {
            ms
        } else if let Some(samples) = gapless.and_then(|g| g.playable_samples()) {
            stream.format().samples_to_ms(samples)
        } else if let (Some(end), true) = (audio_end, first_bytes > 0) {
            let estimated_samples = (end - audio_start) * first_samples / first_bytes;
            stream.format().samples_to_ms(estimated_samples)
        } else {
            0
        };

        stream.raw_total_samples = metadata
            .and_then(|m| m.total_samples())
            .or_else(|| gapless.and_then(|g| g.raw_end()))
            .unwrap_or_else(|| {
                stream.leading_trim_samples() + stream.format().ms_to_samples(total_time_ms)
            });

        stream.info.total_time_ms = total_time_ms;
        stream.info.seekable = !stream.table.is_empty() && total_time_ms > 0;

        debug!(
            table_entries = stream.table.len(),
            estimated = stream.table.is_estimated(),
            total_ms = total_time_ms,
            raw_total_samples = stream.raw_total_samples,
            first_frame_bytes = first_bytes,
            first_frame_samples = first_samples,
            "Seek table ready"
        );

        Ok(stream)
    }

    /// Map a failure during probing to `InitializationFailure`, keeping
    /// configuration and buffer errors as they are.
    fn probe_error(e: PlaybackError, ring: &PrefetchRingBuffer) -> PlaybackError {
        match e {
            PlaybackError::InitializationFailure(_)
            | PlaybackError::BufferExhaustion(_)
            | PlaybackError::InvalidConfig(_) => e,
            other => {
                let cause = ring
                    .read_error()
                    .map(|f| format!("{} (source failed at byte {}: {})", other, f.offset, f.message))
                    .unwrap_or_else(|| other.to_string());
                PlaybackError::InitializationFailure(cause)
            }
        }
    }

    /// Fill `buf` with interleaved PCM.
    ///
    /// Returns `Data(n)` with `n` a whole number of sample frames,
    /// `Pending` when the prefetch thread has not caught up, or
    /// `EndOfStream` once everything was delivered. A source failure is
    /// reported as `Err(SourceIo)` after all PCM decoded before it has been
    /// delivered, and on every call after that until a seek.
    pub fn read_pcm(&mut self, buf: &mut [u8]) -> Result<PcmRead> {
        if !self.state.can_read() {
            return Err(match self.state {
                EngineState::Closed => PlaybackError::NotInitialized,
                state => PlaybackError::InvalidState(state),
            });
        }
        let stream = self.stream.as_mut().ok_or(PlaybackError::NotInitialized)?;

        let block_align = stream.format().block_align();
        let want = buf.len() - buf.len() % block_align;
        if want == 0 {
            return Ok(PcmRead::Data(0));
        }

        if self.state == EngineState::Ready {
            self.state = EngineState::Decoding;
        }

        while !stream.input_done {
            if stream.trimmer.reached_raw_end() {
                stream.finish_input(false);
                self.state = EngineState::Draining;
                debug!(
                    frames = self.stats.frames_decoded,
                    buffered = stream.output.len(),
                    "Gapless end decoded, draining"
                );
                break;
            }

            let ready = stream
                .trimmer
                .releasable(stream.output.len(), stream.holdback, false);
            if ready >= want {
                break;
            }

            match stream.decode_step(&mut self.stats)? {
                StepOutcome::Decoded => {}
                StepOutcome::OutputFull => {
                    self.stats.output_deferrals += 1;
                    break;
                }
                StepOutcome::Starved => {
                    self.stats.input_starvations += 1;
                    break;
                }
                StepOutcome::InputExhausted => {
                    stream.finish_input(true);
                    self.state = EngineState::Draining;
                    debug!(
                        frames = self.stats.frames_decoded,
                        buffered = stream.output.len(),
                        "Input exhausted, draining"
                    );
                }
            }
        }

        let ready = stream
            .trimmer
            .releasable(stream.output.len(), stream.holdback, stream.input_done)
            .min(want);
        if ready > 0 {
            let n = stream.output.consume(buf, ready);
            stream.position_samples += stream.format().bytes_to_samples(n);
            self.stats.bytes_emitted += n as u64;
            return Ok(PcmRead::Data(n));
        }

        if stream.input_done && stream.output.is_empty() {
            // A failure past the gapless end cuts nothing the listener hears.
            let failure = stream
                .ring
                .read_error()
                .filter(|_| !stream.stopped_at_raw_end);
            if let Some(failure) = failure {
                let position_ms = stream.position_ms();
                error!(
                    offset = failure.offset,
                    position_ms,
                    error = %failure.message,
                    "Source failed"
                );
                return Err(PlaybackError::SourceIo {
                    offset: failure.offset,
                    position_ms,
                    message: failure.message,
                });
            }
            return Ok(PcmRead::EndOfStream);
        }

        Ok(PcmRead::Pending)
    }

    /// Reposition to `time_ms` and return the position actually reached.
    ///
    /// Streams without a usable seek table or duration are not seekable;
    /// the call is then a no-op returning the current position.
    #[instrument(skip(self))]
    pub fn seek(&mut self, time_ms: u64) -> Result<u64> {
        if !self.state.can_seek() {
            return Err(match self.state {
                EngineState::Closed => PlaybackError::NotInitialized,
                state => PlaybackError::InvalidState(state),
            });
        }
        let stream = self.stream.as_mut().ok_or(PlaybackError::NotInitialized)?;

        let total = stream.info.total_time_ms;
        if stream.table.is_empty() || total == 0 {
            debug!("Stream not seekable, staying at current position");
            return Ok(stream.position_ms());
        }

        let previous = self.state;
        self.state = EngineState::Seeking;

        // Table fractions span the raw decoder output, delay and padding
        // included, so the target is shifted by the leading trim first.
        let target = time_ms.min(total);
        let leading = stream.leading_trim_samples();
        let raw_target = stream.format().ms_to_samples(target) + leading;
        let raw_total = stream.raw_total_samples.max(1);
        let offset = stream
            .table
            .time_to_offset(raw_target as f64 / raw_total as f64);
        let raw_index = stream.raw_index_at(offset);
        let sample = raw_index
            .saturating_sub(leading)
            .min(stream.format().ms_to_samples(total));
        let actual = stream.format().samples_to_ms(sample);

        stream.ring.seek(offset);
        stream.input.reset(offset);
        stream.output.clear();
        stream.decoder.flush();
        stream.trimmer.on_seek(raw_index);

        stream.position_samples = sample;
        stream.last_frame_offset = offset;
        stream.frames_end = offset;
        stream.input_done = false;
        stream.stopped_at_raw_end = false;
        stream.tail_trimmed = false;
        stream.seeked = true;
        stream.rebase_pending = true;
        self.stats.seeks += 1;
        self.state = EngineState::Ready;

        info!(
            target,
            actual,
            offset,
            from = ?previous,
            "Seek complete"
        );
        Ok(actual)
    }

    /// Close the track: stop the prefetch thread (which closes the source)
    /// and drop the decoder. Safe to call in any state.
    pub fn deinit(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.ring.stop();
            info!(
                source = %stream.description,
                frames = self.stats.frames_decoded,
                bytes_emitted = self.stats.bytes_emitted,
                resyncs = stream.input.resyncs(),
                "Track closed"
            );
        }
        self.state = EngineState::Closed;
    }

    /// Counters for the open (or last) track.
    pub fn stats(&self) -> EngineStats {
        let mut stats = self.stats.clone();
        if let Some(stream) = &self.stream {
            stats.resyncs = stream.input.resyncs();
            stats.resync_bytes = stream.input.resync_bytes();
            stats.leading_trimmed_samples = stream.trimmer.leading_trimmed();
            stats.trailing_trimmed_samples = stream.trimmer.trailing_trimmed();
        }
        stats
    }

    pub fn position(&self) -> PlaybackPosition {
        match &self.stream {
            Some(stream) => PlaybackPosition {
                samples: stream.position_samples,
                position_ms: stream.position_ms(),
                duration_ms: stream.info.total_time_ms,
                bytes_consumed: stream.input.consumed_offset(),
                end_of_source: stream.input_done,
                decoding_in_progress: self.state == EngineState::Decoding,
            },
            None => PlaybackPosition::default(),
        }
    }

    pub fn position_ms(&self) -> u64 {
        self.position().position_ms
    }

    /// Source offset of the most recently decoded frame.
    pub fn last_frame_offset(&self) -> Option<u64> {
        self.stream.as_ref().map(|s| s.last_frame_offset)
    }

    pub fn seek_table(&self) -> Option<&VbrSeekTable> {
        self.stream.as_ref().map(|s| &s.table)
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream.as_ref().map(|s| &s.info)
    }

    /// Prefetch ring fill fraction (0.0 - 1.0).
    pub fn buffer_fill(&self) -> f32 {
        self.stream.as_ref().map_or(0.0, |s| s.ring.fill_level())
    }
}

impl Drop for StreamingDecodeEngine {
    fn drop(&mut self) {
        self.deinit();
    }
}
