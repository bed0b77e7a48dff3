mod helpers;

use bridge_traits::source::{ByteSource, MemorySource};
use core_playback::{
    AudioCodec, AudioFormat, DecodeOutcome, EngineState, FrameDecoder, GaplessInfo, PcmRead,
    PlaybackError, ProbeOutcome, SeekTableEntry, StreamingDecodeEngine, VbrSeekTable,
};
use helpers::*;

/// About 10 s of VBR frames whose size changes every 20 frames.
fn vbr_stream() -> SyntheticStream {
    SyntheticStream::build(383, 1152, |k| 250 + ((k / 20) % 5) as u16 * 60)
}

fn open_with_table(stream: &SyntheticStream, metadata: &StaticMetadata) -> StreamingDecodeEngine {
    init_test_logging();
    let mut engine = StreamingDecodeEngine::new(test_config());
    engine
        .init(
            Box::new(MemorySource::new(stream.bytes.clone())),
            Box::new(SyntheticDecoder::new()),
            Some(metadata),
        )
        .unwrap();
    engine
}

fn first_tag_after_seek(engine: &mut StreamingDecodeEngine) -> u32 {
    let mut buf = vec![0u8; 4096];
    match read_some(engine, &mut buf).unwrap() {
        PcmRead::Data(n) => tags(&buf[..n])[0],
        other => panic!("expected audio after seek, got {:?}", other),
    }
}

#[test]
fn test_vbr_seek_lands_within_one_frame() {
    let stream = vbr_stream();
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(100)),
        duration_ms: Some(stream.duration_ms()),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);
    assert!(engine.stream_info().unwrap().seekable);
    assert_eq!(engine.seek_table().unwrap().len(), 101);

    let actual = engine.seek(5000).unwrap();
    assert!(actual.abs_diff(5000) <= 26, "reported {} ms", actual);
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.position_ms(), actual);

    let target_sample = 5000 * SAMPLE_RATE as u64 / 1000;
    let first = first_tag_after_seek(&mut engine) as u64;
    assert!(
        first.abs_diff(target_sample) <= 1152,
        "first sample {} for target {}",
        first,
        target_sample
    );
    assert_eq!(engine.state(), EngineState::Decoding);
    assert_eq!(engine.stats().seeks, 1);
}

#[test]
fn test_seek_discards_buffered_audio() {
    let stream = vbr_stream();
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(100)),
        duration_ms: Some(stream.duration_ms()),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    let mut buf = vec![0u8; 1024];
    read_some(&mut engine, &mut buf).unwrap();

    engine.seek(8000).unwrap();
    let first = first_tag_after_seek(&mut engine) as u64;
    assert!(first > 7900 * SAMPLE_RATE as u64 / 1000);

    // Back to the start, then play through to the end.
    assert_eq!(engine.seek(0).unwrap(), 0);
    let tags = tags(&read_to_end(&mut engine, 8192).unwrap());
    assert_eq!(tags[0], 0);
    assert_eq!(tags.len() as u64, stream.total_samples());
}

#[test]
fn test_seek_past_end_clamps_to_duration() {
    let stream = SyntheticStream::build(40, 1152, |_| 200);
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(10)),
        duration_ms: Some(stream.duration_ms()),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    let actual = engine.seek(u64::MAX).unwrap();
    assert_eq!(actual, stream.duration_ms());

    let mut buf = vec![0u8; 4096];
    assert_eq!(read_some(&mut engine, &mut buf).unwrap(), PcmRead::EndOfStream);
}

#[test]
fn test_seek_after_end_of_stream_resumes() {
    let stream = SyntheticStream::build(30, 1152, |_| 200);
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(30)),
        duration_ms: Some(stream.duration_ms()),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    read_to_end(&mut engine, 8192).unwrap();
    assert_eq!(engine.state(), EngineState::Draining);

    engine.seek(stream.duration_ms() / 2).unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    let rest = read_to_end(&mut engine, 8192).unwrap();
    assert!(!rest.is_empty());
    assert_eq!(
        *tags(&rest).last().unwrap() as u64,
        stream.total_samples() - 1
    );
}

#[test]
fn test_seek_rearms_trailing_trim_but_not_leading() {
    let stream = SyntheticStream::build(40, 1152, |_| 200);
    let total = stream.total_samples();
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(40)),
        gapless: Some(GaplessInfo::new(600, Some(total - 800)).with_decoder_delay(100)),
        duration_ms: Some(stream.duration_ms()),
        total_samples: Some(total),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    let half = stream.duration_ms() / 2;
    let actual = engine.seek(half).unwrap();
    assert!(actual.abs_diff(half) <= 26, "reported {} ms", actual);
    let tags = tags(&read_to_end(&mut engine, 4096).unwrap());

    // The landing frame is released whole: no leading trim after a seek.
    let raw_target = half * SAMPLE_RATE as u64 / 1000 + 700;
    let first = tags[0] as u64;
    assert_eq!(first % 1152, 0);
    assert!(first.abs_diff(raw_target) <= 1152, "first sample {}", first);

    // Trailing trim cuts exactly the padding.
    let raw_last = 100 + total - 800;
    assert_eq!(*tags.last().unwrap() as u64, raw_last);
    assert!(engine.stats().trailing_trimmed_samples > 0);
}

#[test]
fn test_seek_to_start_keeps_trailing_trim_exact() {
    // Leading trim of 1529 raw samples spans more than one frame.
    let stream = SyntheticStream::build(20, 1152, |_| 200);
    let total = stream.total_samples();
    let gapless = GaplessInfo::new(1000, Some(total - 1 - 2000)).with_decoder_delay(529);
    let raw_last = 529 + total - 1 - 2000;
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(20)),
        gapless: Some(gapless),
        total_samples: Some(total),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    let tags_open = tags(&read_to_end(&mut engine, 4096).unwrap());
    assert_eq!(tags_open[0], 1529);
    assert_eq!(*tags_open.last().unwrap() as u64, raw_last);

    assert_eq!(engine.seek(0).unwrap(), 0);
    let tags_seek = tags(&read_to_end(&mut engine, 4096).unwrap());
    assert!(
        (tags_seek[0] as u64) < 1529 + 1152,
        "first sample {}",
        tags_seek[0]
    );
    assert_eq!(*tags_seek.last().unwrap() as u64, raw_last);
    assert!(tags_seek.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn test_seek_without_total_samples_uses_gapless_end() {
    let stream = SyntheticStream::build(20, 1152, |_| 200);
    let total = stream.total_samples();
    let gapless = GaplessInfo::new(1000, Some(total - 1 - 2000)).with_decoder_delay(529);
    let metadata = StaticMetadata {
        points: Some(stream.seek_points(20)),
        gapless: Some(gapless),
        ..Default::default()
    };
    let mut engine = open_with_table(&stream, &metadata);

    engine.seek(200).unwrap();
    let tags = tags(&read_to_end(&mut engine, 4096).unwrap());
    // The table end is taken as the gapless end, short of the trailing
    // padding, so the tail is exact only to within a frame.
    let raw_last = 529 + total - 1 - 2000;
    let last = *tags.last().unwrap() as u64;
    assert!(last.abs_diff(raw_last) <= 1152, "last sample {}", last);
}

#[test]
fn test_unseekable_stream_ignores_seek() {
    let stream = SyntheticStream::build(10, 1152, |_| 200);
    let metadata = StaticMetadata {
        points: Some(Vec::new()),
        duration_ms: None,
        audio_end: None,
        ..Default::default()
    };

    struct Unsized(MemorySource);
    impl ByteSource for Unsized {
        fn read(&mut self, buf: &mut [u8]) -> bridge_traits::error::Result<usize> {
            self.0.read(buf)
        }
        fn seek(&mut self, pos: std::io::SeekFrom) -> bridge_traits::error::Result<u64> {
            self.0.seek(pos)
        }
        fn length(&self) -> Option<u64> {
            None
        }
        fn at_end(&self) -> bool {
            self.0.at_end()
        }
    }

    let mut engine = StreamingDecodeEngine::new(test_config());
    let info = engine
        .init(
            Box::new(Unsized(MemorySource::new(stream.bytes.clone()))),
            Box::new(SyntheticDecoder::new()),
            Some(&metadata),
        )
        .unwrap();
    assert!(!info.seekable);

    let mut buf = vec![0u8; 4096];
    read_some(&mut engine, &mut buf).unwrap();
    let before = engine.position_ms();
    assert_eq!(engine.seek(100).unwrap(), before);
    assert_eq!(engine.stats().seeks, 0);
}

#[test]
fn test_seek_requires_open_track() {
    let mut engine = StreamingDecodeEngine::new(test_config());
    assert!(matches!(engine.seek(0), Err(PlaybackError::NotInitialized)));
}

mockall::mock! {
    pub Decoder {}

    impl FrameDecoder for Decoder {
        fn codec(&self) -> AudioCodec;
        fn probe_format(&mut self, input: &[u8]) -> ProbeOutcome;
        fn decode_next(&mut self, input: &[u8], output: &mut [u8]) -> DecodeOutcome;
        fn flush(&mut self);
        fn max_frame_bytes(&self) -> usize;
        fn lookahead_bytes(&self) -> usize;
        fn decoder_delay_samples(&self) -> u64;
    }
}

/// One byte per frame, one 16-bit stereo sample per byte, 1 kHz.
fn byte_per_sample_decoder() -> MockDecoder {
    let mut decoder = MockDecoder::new();
    decoder
        .expect_codec()
        .return_const(AudioCodec::Other("mock".to_string()));
    decoder
        .expect_probe_format()
        .returning(|_| ProbeOutcome::Format(AudioFormat::new(AudioCodec::Other("mock".to_string()), 1000, 2, 16)));
    decoder.expect_decode_next().returning(|input, output| {
        output[..4].copy_from_slice(&[input[0], 0, 0, 0]);
        DecodeOutcome::Decoded {
            consumed: 1,
            produced: 4,
        }
    });
    decoder.expect_max_frame_bytes().return_const(4usize);
    decoder.expect_lookahead_bytes().return_const(0usize);
    decoder.expect_decoder_delay_samples().return_const(0u64);
    decoder
}

#[test]
fn test_seek_flushes_decoder_once() {
    let mut decoder = byte_per_sample_decoder();
    decoder.expect_flush().times(1).return_const(());

    let metadata = StaticMetadata {
        points: Some(vec![SeekTableEntry::new(0.0, 0), SeekTableEntry::new(1.0, 1000)]),
        duration_ms: Some(1000),
        ..Default::default()
    };
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let mut engine = StreamingDecodeEngine::new(test_config());
    engine
        .init(Box::new(MemorySource::new(data)), Box::new(decoder), Some(&metadata))
        .unwrap();

    assert_eq!(engine.seek(500).unwrap(), 500);
    let mut buf = [0u8; 4];
    assert_eq!(read_some(&mut engine, &mut buf).unwrap(), PcmRead::Data(4));
    assert_eq!(buf[0], (500 % 251) as u8);
    assert_eq!(engine.last_frame_offset(), Some(500));
    engine.deinit();
}

#[test]
fn test_deinit_never_flushes() {
    let mut decoder = byte_per_sample_decoder();
    decoder.expect_flush().never();

    let mut engine = StreamingDecodeEngine::new(test_config());
    engine
        .init(
            Box::new(MemorySource::new(vec![1u8; 16])),
            Box::new(decoder),
            None,
        )
        .unwrap();
    engine.deinit();
}

#[test]
fn test_xing_toc_lookup_is_monotonic() {
    let mut toc = [0u8; 100];
    for (i, entry) in toc.iter_mut().enumerate() {
        // Front-loaded bitrate: bytes grow faster early on.
        *entry = ((i as f64 / 100.0).sqrt() * 255.0) as u8;
    }
    let table = VbrSeekTable::from_xing_toc(&toc, 1_000, 4_000_000);

    let mut last = 0;
    for step in 0..=1000 {
        let offset = table.time_to_offset(step as f64 / 1000.0);
        assert!(offset >= last);
        assert!((1_000..=4_001_000).contains(&offset));
        last = offset;
    }
    assert_eq!(table.time_to_offset(0.0), 1_000);
    assert_eq!(table.time_to_offset(1.0), 4_001_000);
}

#[test]
fn test_seek_table_time_round_trip() {
    let stream = vbr_stream();
    let table = VbrSeekTable::from_entries(0, stream.seek_points(100)).unwrap();
    let duration = stream.duration_ms();

    for time_ms in (0..duration).step_by(137) {
        let offset = table.time_ms_to_offset(time_ms, duration);
        let back = table.offset_to_time(offset, duration);
        assert!(back.abs_diff(time_ms) <= 1, "{} -> {} -> {}", time_ms, offset, back);
    }
}

#[test]
fn test_seek_table_rejects_decreasing_offsets() {
    let entries = vec![
        SeekTableEntry::new(0.0, 100),
        SeekTableEntry::new(0.5, 50),
        SeekTableEntry::new(1.0, 200),
    ];
    assert!(matches!(
        VbrSeekTable::from_entries(0, entries),
        Err(PlaybackError::InvalidSeekTable(_))
    ));
}
