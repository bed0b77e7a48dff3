//! # Codec Dispatch
//!
//! Uniform open/seek/read/close surface over the decode engine, one entry
//! per codec. The registry maps an [`AudioCodec`] (usually detected from a
//! file extension or MIME type) to a decoder factory and an optional
//! container metadata reader.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bridge_traits::source::ByteSource;
use core_runtime::logging::strip_path;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, EngineState};
use crate::decoder::{DecoderLock, FormatDetector, SerializedDecoder};
use crate::engine::StreamingDecodeEngine;
use crate::error::{PlaybackError, Result};
use crate::traits::{AudioCodec, FrameDecoder, PcmRead, SeekMetadataProvider, StreamInfo};

/// Creates a fresh decoder for every opened track.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn FrameDecoder> + Send + Sync>;

/// Reads container metadata before decoding starts. Returns `Ok(None)` for
/// streams without any.
pub type MetadataReader = fn(&mut dyn ByteSource) -> Result<Option<Box<dyn SeekMetadataProvider>>>;

/// Open/seek/read/close for one codec.
pub trait PcmCodec: Send {
    fn codec(&self) -> AudioCodec;

    /// Open `source` and decode up to the first audio frame.
    fn init(&mut self, source: Box<dyn ByteSource>) -> Result<StreamInfo>;

    /// Reposition to `time_ms`; returns the position reached.
    fn seek(&mut self, time_ms: u64) -> Result<u64>;

    fn read_pcm(&mut self, buf: &mut [u8]) -> Result<PcmRead>;

    /// Close the track. Safe to call repeatedly.
    fn deinit(&mut self);
}

/// [`PcmCodec`] backed by a [`StreamingDecodeEngine`].
pub struct FormatCodec {
    codec: AudioCodec,
    engine: StreamingDecodeEngine,
    factory: DecoderFactory,
    metadata: Option<MetadataReader>,
    lock: Option<DecoderLock>,
}

impl FormatCodec {
    pub fn new(codec: AudioCodec, config: EngineConfig, factory: DecoderFactory) -> Self {
        Self {
            codec,
            engine: StreamingDecodeEngine::new(config),
            factory,
            metadata: None,
            lock: None,
        }
    }

    pub fn with_metadata(mut self, reader: MetadataReader) -> Self {
        self.metadata = Some(reader);
        self
    }

    /// Route every decoder call through `lock`.
    pub fn serialized(mut self, lock: DecoderLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn engine(&self) -> &StreamingDecodeEngine {
        &self.engine
    }

    fn read_metadata(&self, source: &mut dyn ByteSource) -> Option<Box<dyn SeekMetadataProvider>> {
        let reader = self.metadata?;
        match reader(source) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Container metadata unreadable, continuing without it");
                None
            }
        }
    }

    fn new_decoder(&self) -> Box<dyn FrameDecoder> {
        let decoder = (self.factory)();
        match &self.lock {
            Some(lock) => Box::new(SerializedDecoder::new(decoder, lock.clone())),
            None => decoder,
        }
    }
}

impl PcmCodec for FormatCodec {
    fn codec(&self) -> AudioCodec {
        self.codec.clone()
    }

    fn init(&mut self, mut source: Box<dyn ByteSource>) -> Result<StreamInfo> {
        let metadata = self.read_metadata(&mut *source);
        let decoder = self.new_decoder();
        self.engine.init(source, decoder, metadata.as_deref())
    }

    fn seek(&mut self, time_ms: u64) -> Result<u64> {
        self.engine.seek(time_ms)
    }

    fn read_pcm(&mut self, buf: &mut [u8]) -> Result<PcmRead> {
        self.engine.read_pcm(buf)
    }

    fn deinit(&mut self) {
        if self.engine.state() != EngineState::Closed {
            self.engine.deinit();
        }
    }
}

#[derive(Clone)]
struct CodecEntry {
    factory: DecoderFactory,
    metadata: Option<MetadataReader>,
    serialized: bool,
}

/// Codec dispatch table.
#[derive(Clone)]
pub struct CodecRegistry {
    config: EngineConfig,
    entries: HashMap<AudioCodec, CodecEntry>,
    lock: DecoderLock,
}

impl CodecRegistry {
    /// Empty registry; every `create` fails until codecs are registered.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            lock: DecoderLock::new(),
        }
    }

    /// Registry with every decoder compiled into this build.
    pub fn with_defaults(config: EngineConfig) -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new(config);

        #[cfg(feature = "decoder-mp3")]
        registry.register(
            AudioCodec::Mp3,
            Arc::new(|| Box::new(crate::decoder::Mp3FrameDecoder::new()) as Box<dyn FrameDecoder>),
            Some(read_mp3_metadata),
        );

        registry
    }

    /// Register (or replace) the decoder for `codec`.
    pub fn register(
        &mut self,
        codec: AudioCodec,
        factory: DecoderFactory,
        metadata: Option<MetadataReader>,
    ) {
        debug!(?codec, "Registering frame decoder");
        self.entries.insert(
            codec,
            CodecEntry {
                factory,
                metadata,
                serialized: false,
            },
        );
    }

    /// Register a decoder whose library is not reentrant. All decoders
    /// registered this way share one lock.
    pub fn register_serialized(
        &mut self,
        codec: AudioCodec,
        factory: DecoderFactory,
        metadata: Option<MetadataReader>,
    ) {
        self.register(codec.clone(), factory, metadata);
        if let Some(entry) = self.entries.get_mut(&codec) {
            entry.serialized = true;
        }
    }

    pub fn supports(&self, codec: &AudioCodec) -> bool {
        self.entries.contains_key(codec)
    }

    pub fn codecs(&self) -> Vec<AudioCodec> {
        self.entries.keys().cloned().collect()
    }

    /// Create a closed codec instance for `codec`.
    pub fn create(&self, codec: &AudioCodec) -> Result<Box<dyn PcmCodec>> {
        let entry = self.entries.get(codec).ok_or_else(|| {
            PlaybackError::UnsupportedCodec(format!("no decoder registered for {:?}", codec))
        })?;

        let mut instance = FormatCodec::new(
            codec.clone(),
            self.config.clone(),
            Arc::clone(&entry.factory),
        );
        if let Some(reader) = entry.metadata {
            instance = instance.with_metadata(reader);
        }
        if entry.serialized {
            instance = instance.serialized(self.lock.clone());
        }
        Ok(Box::new(instance))
    }

    /// Create a codec instance from a file path's extension.
    pub fn create_for_path(&self, path: &Path) -> Result<Box<dyn PcmCodec>> {
        let codec = FormatDetector::codec_from_path(path);
        info!(
            file = %strip_path(&path.to_string_lossy()),
            ?codec,
            "Selecting decoder"
        );
        self.create(&codec)
    }

    /// Create a codec instance from a MIME type.
    pub fn create_for_mime(&self, mime_type: &str) -> Result<Box<dyn PcmCodec>> {
        let codec = FormatDetector::codec_from_mime_type(mime_type);
        debug!(mime_type, ?codec, "Selecting decoder");
        self.create(&codec)
    }
}

#[cfg(feature = "decoder-mp3")]
fn read_mp3_metadata(source: &mut dyn ByteSource) -> Result<Option<Box<dyn SeekMetadataProvider>>> {
    let metadata = crate::metadata::Mp3SeekMetadata::read(source)?;
    Ok(Some(Box::new(metadata)))
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
