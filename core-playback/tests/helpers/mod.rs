//! Shared fixtures: a synthetic frame format whose decoded samples carry
//! their own raw index, plus sources and metadata providers.

#![allow(dead_code)]

use std::io::SeekFrom;
use std::time::Duration;

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::source::{resolve_seek, ByteSource};
use core_playback::{
    AudioCodec, AudioFormat, DecodeOutcome, EngineConfig, FrameDecoder, GaplessInfo, PcmRead,
    ProbeOutcome, Result, SeekMetadataProvider, SeekTableEntry, StreamingDecodeEngine,
};

pub const SAMPLE_RATE: u32 = 44_100;
pub const BLOCK_ALIGN: usize = 4;
pub const MAX_FRAME_SAMPLES: usize = 1152;
pub const MAX_FRAME_BYTES: usize = MAX_FRAME_SAMPLES * BLOCK_ALIGN;

const MAGIC: [u8; 2] = [0xA5, 0x5A];
const HEADER_LEN: usize = 10;

/// Frame layout: magic, sample count (u16 LE), raw index of the first
/// sample (u32 LE), payload length (u16 LE), payload.
pub fn frame(first_sample: u32, samples: u16, payload: u16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload as usize);
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&samples.to_le_bytes());
    bytes.extend_from_slice(&first_sample.to_le_bytes());
    bytes.extend_from_slice(&payload.to_le_bytes());
    bytes.resize(HEADER_LEN + payload as usize, 0);
    bytes
}

/// Encoded stream plus the offset of every frame.
pub struct SyntheticStream {
    pub bytes: Vec<u8>,
    pub frame_offsets: Vec<u64>,
    pub samples_per_frame: u16,
}

impl SyntheticStream {
    pub fn build(frames: usize, samples_per_frame: u16, payload: impl Fn(usize) -> u16) -> Self {
        let mut bytes = Vec::new();
        let mut frame_offsets = Vec::with_capacity(frames);
        for k in 0..frames {
            frame_offsets.push(bytes.len() as u64);
            let first = (k * samples_per_frame as usize) as u32;
            bytes.extend(frame(first, samples_per_frame, payload(k)));
        }
        Self {
            bytes,
            frame_offsets,
            samples_per_frame,
        }
    }

    pub fn total_samples(&self) -> u64 {
        self.frame_offsets.len() as u64 * self.samples_per_frame as u64
    }

    pub fn duration_ms(&self) -> u64 {
        self.total_samples() * 1000 / SAMPLE_RATE as u64
    }

    /// Byte offset of raw sample `sample`, interpolated inside its frame.
    pub fn offset_of_sample(&self, sample: u64) -> u64 {
        let spf = self.samples_per_frame as u64;
        let index = (sample / spf) as usize;
        let Some(&start) = self.frame_offsets.get(index) else {
            return self.bytes.len() as u64;
        };
        let end = self
            .frame_offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.bytes.len() as u64);
        start + (end - start) * (sample % spf) / spf
    }

    /// `points + 1` entries mapping duration fractions to byte offsets.
    pub fn seek_points(&self, points: usize) -> Vec<SeekTableEntry> {
        (0..=points)
            .map(|i| {
                let fraction = i as f64 / points as f64;
                let sample = (fraction * self.total_samples() as f64) as u64;
                SeekTableEntry::new(fraction, self.offset_of_sample(sample))
            })
            .collect()
    }
}

/// Decoder for [`frame`]s. Sample `i` of a frame decodes to the 4-byte tag
/// `first_sample + i`.
#[derive(Debug, Default)]
pub struct SyntheticDecoder {
    delay: u64,
    pub flushes: usize,
}

impl SyntheticDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: u64) -> Self {
        Self { delay, flushes: 0 }
    }

    pub fn format() -> AudioFormat {
        AudioFormat::new(AudioCodec::Other("synthetic".to_string()), SAMPLE_RATE, 2, 16)
    }
}

fn next_magic(input: &[u8]) -> usize {
    input
        .windows(2)
        .skip(1)
        .position(|w| w == MAGIC)
        .map_or(input.len().saturating_sub(1).max(1), |p| p + 1)
}

impl FrameDecoder for SyntheticDecoder {
    fn codec(&self) -> AudioCodec {
        AudioCodec::Other("synthetic".to_string())
    }

    fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome {
        if input.windows(2).any(|w| w == MAGIC) {
            ProbeOutcome::Format(Self::format())
        } else {
            ProbeOutcome::NeedMoreInput
        }
    }

    fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome {
        if input.len() < 2 {
            return DecodeOutcome::NeedMoreInput;
        }
        if input[..2] != MAGIC {
            return DecodeOutcome::Resync {
                skip: next_magic(input),
            };
        }
        if input.len() < HEADER_LEN {
            return DecodeOutcome::NeedMoreInput;
        }

        let samples = u16::from_le_bytes([input[2], input[3]]) as usize;
        let first = u32::from_le_bytes([input[4], input[5], input[6], input[7]]);
        let payload = u16::from_le_bytes([input[8], input[9]]) as usize;
        if samples > MAX_FRAME_SAMPLES {
            return DecodeOutcome::Resync { skip: 1 };
        }
        let len = HEADER_LEN + payload;
        if input.len() < len {
            return DecodeOutcome::NeedMoreInput;
        }

        for i in 0..samples {
            let tag = first + i as u32;
            output[i * BLOCK_ALIGN..(i + 1) * BLOCK_ALIGN].copy_from_slice(&tag.to_le_bytes());
        }
        DecodeOutcome::Decoded {
            consumed: len,
            produced: samples * BLOCK_ALIGN,
        }
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn max_frame_bytes(&self) -> usize {
        MAX_FRAME_BYTES
    }

    fn decoder_delay_samples(&self) -> u64 {
        self.delay
    }
}

/// Fixed metadata for a test stream.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    pub points: Option<Vec<SeekTableEntry>>,
    pub gapless: Option<GaplessInfo>,
    pub duration_ms: Option<u64>,
    pub total_samples: Option<u64>,
    pub audio_start: u64,
    pub audio_end: Option<u64>,
}

impl SeekMetadataProvider for StaticMetadata {
    fn seek_points(&self) -> Option<Vec<SeekTableEntry>> {
        self.points.clone()
    }

    fn gapless_info(&self) -> Option<GaplessInfo> {
        self.gapless
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn total_samples(&self) -> Option<u64> {
        self.total_samples
    }

    fn audio_start(&self) -> u64 {
        self.audio_start
    }

    fn audio_end(&self) -> Option<u64> {
        self.audio_end
    }
}

/// In-memory source whose reads fail once they reach `fail_at`.
pub struct FailingSource {
    data: Vec<u8>,
    position: u64,
    fail_at: u64,
}

impl FailingSource {
    pub fn new(data: Vec<u8>, fail_at: u64) -> Self {
        Self {
            data,
            position: 0,
            fail_at,
        }
    }
}

impl ByteSource for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        if self.position >= self.fail_at {
            return Err(BridgeError::OperationFailed("connection reset".to_string()));
        }
        let end = self.fail_at.min(self.data.len() as u64);
        let n = (end.saturating_sub(self.position) as usize).min(buf.len());
        let start = self.position as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> BridgeResult<u64> {
        self.position = resolve_seek(pos, self.position, Some(self.data.len() as u64))?;
        Ok(self.position)
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn at_end(&self) -> bool {
        self.position >= self.data.len() as u64
    }

    fn description(&self) -> String {
        "failing-memory".to_string()
    }
}

/// Small buffers so tests exercise wrap-around and refills.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        ring_capacity_bytes: 16 * 1024,
        read_chunk_bytes: 1024,
        input_capacity_bytes: 8 * 1024,
        output_capacity_bytes: 4 * MAX_FRAME_BYTES,
        prefetch_idle_wait: Duration::from_millis(2),
        probe_poll_interval: Duration::from_millis(2),
        ..EngineConfig::default()
    }
}

/// Read until `EndOfStream`, returning the PCM or the first error.
pub fn read_to_end(engine: &mut StreamingDecodeEngine, chunk: usize) -> Result<Vec<u8>> {
    let mut pcm = Vec::new();
    let mut buf = vec![0u8; chunk];
    let mut idle = 0;
    loop {
        match engine.read_pcm(&mut buf)? {
            PcmRead::Data(n) => {
                idle = 0;
                pcm.extend_from_slice(&buf[..n]);
            }
            PcmRead::Pending => {
                idle += 1;
                assert!(idle < 5_000, "engine made no progress");
                std::thread::sleep(Duration::from_millis(1));
            }
            PcmRead::EndOfStream => return Ok(pcm),
        }
    }
}

/// Read until at least one byte arrives.
pub fn read_some(engine: &mut StreamingDecodeEngine, buf: &mut [u8]) -> Result<PcmRead> {
    for _ in 0..5_000 {
        match engine.read_pcm(buf)? {
            PcmRead::Pending => std::thread::sleep(Duration::from_millis(1)),
            other => return Ok(other),
        }
    }
    panic!("engine made no progress");
}

/// Decode the 4-byte sample tags of `pcm`.
pub fn tags(pcm: &[u8]) -> Vec<u32> {
    pcm.chunks_exact(BLOCK_ALIGN)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("core_playback=debug")
        .with_test_writer()
        .try_init();
}
