//! # Decode Demo
//!
//! Decodes an MP3 file to raw PCM, optionally starting from a seek
//! position, and prints the engine counters as JSON.
//!
//! Run with:
//! `cargo run --example decode_demo --package core-playback -- track.mp3 [seek_ms] [out.pcm]`

use bridge_desktop::FileSource;
use bridge_traits::logging::LogLevel;
use core_playback::{
    EngineConfig, Mp3FrameDecoder, Mp3SeekMetadata, PcmRead, StreamingDecodeEngine,
};
use core_runtime::logging::{init_logging, LogFormat, LogTarget, LoggingConfig};
use std::io::Write;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // PCM may go to stdout, so logs go to stderr.
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Info)
            .with_output(LogTarget::Stderr),
    )?;

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: decode_demo <file.mp3> [seek_ms] [out.pcm]")?;
    let seek_ms: Option<u64> = args.next().map(|s| s.parse()).transpose()?;
    let mut out: Box<dyn Write> = match args.next() {
        Some(out) => Box::new(std::fs::File::create(out)?),
        None => Box::new(std::io::sink()),
    };

    let mut source = FileSource::open(&path)?;
    let metadata = Mp3SeekMetadata::read(&mut source)?;

    let mut engine = StreamingDecodeEngine::new(EngineConfig::local_file());
    let info = engine.init(
        Box::new(source),
        Box::new(Mp3FrameDecoder::new()),
        Some(&metadata),
    )?;
    println!(
        "{}: {} Hz, {} ch, {} ms, seekable: {}",
        path,
        info.format.sample_rate,
        info.format.channels,
        info.total_time_ms,
        info.seekable
    );

    if let Some(target) = seek_ms {
        let reached = engine.seek(target)?;
        println!("seek {} ms -> {} ms", target, reached);
    }

    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match engine.read_pcm(&mut buf)? {
            PcmRead::Data(n) => out.write_all(&buf[..n])?,
            PcmRead::Pending => std::thread::sleep(Duration::from_millis(1)),
            PcmRead::EndOfStream => break,
        }
    }
    out.flush()?;

    println!("ended at {} ms", engine.position_ms());
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    engine.deinit();
    Ok(())
}
