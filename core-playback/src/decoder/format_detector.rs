//! # Format Detection Module
//!
//! Maps file extensions and MIME types to [`AudioCodec`] and back. Used by
//! the codec registry to pick a decoder before any bytes are read.

use crate::traits::AudioCodec;
use std::path::Path;
use tracing::debug;

/// Format detector for audio streams.
pub struct FormatDetector;

impl FormatDetector {
    /// Detect the codec from a file path's extension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_playback::{AudioCodec, FormatDetector};
    /// use std::path::Path;
    ///
    /// assert_eq!(FormatDetector::codec_from_path(Path::new("/music/song.MP3")), AudioCodec::Mp3);
    /// ```
    pub fn codec_from_path(path: &Path) -> AudioCodec {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) => Self::codec_from_extension(extension),
            None => {
                debug!("No file extension found, codec unknown");
                AudioCodec::Unknown
            }
        }
    }

    /// Detect the codec from a bare extension (case-insensitive, no dot).
    pub fn codec_from_extension(extension: &str) -> AudioCodec {
        match extension.to_ascii_lowercase().as_str() {
            "mp3" | "mp2" | "mpa" => AudioCodec::Mp3,
            "aac" | "m4a" | "mp4" => AudioCodec::Aac,
            "flac" => AudioCodec::Flac,
            "ogg" | "oga" => AudioCodec::Vorbis,
            "opus" => AudioCodec::Opus,
            "wav" | "wave" => AudioCodec::Wav,
            "alac" => AudioCodec::Alac,
            other => {
                debug!(extension = other, "Unrecognized audio extension");
                AudioCodec::Unknown
            }
        }
    }

    /// Detect the codec from a MIME type. Parameters such as `; charset=`
    /// are ignored.
    pub fn codec_from_mime_type(mime_type: &str) -> AudioCodec {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" => AudioCodec::Mp3,
            "audio/aac" | "audio/aacp" | "audio/mp4" | "audio/x-m4a" => AudioCodec::Aac,
            "audio/flac" | "audio/x-flac" => AudioCodec::Flac,
            "audio/ogg" | "audio/vorbis" | "application/ogg" => AudioCodec::Vorbis,
            "audio/opus" => AudioCodec::Opus,
            "audio/wav" | "audio/x-wav" | "audio/wave" => AudioCodec::Wav,
            other => {
                debug!(mime_type = other, "Unrecognized audio MIME type");
                AudioCodec::Unknown
            }
        }
    }

    /// Get the common file extension for a codec.
    pub fn codec_extension(codec: &AudioCodec) -> &'static str {
        match codec {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Aac => "m4a",
            AudioCodec::Flac => "flac",
            AudioCodec::Vorbis => "ogg",
            AudioCodec::Opus => "opus",
            AudioCodec::Wav => "wav",
            AudioCodec::Alac => "m4a",
            AudioCodec::Unknown | AudioCodec::Other(_) => "bin",
        }
    }

    /// Get the MIME type for a codec.
    pub fn codec_mime_type(codec: &AudioCodec) -> &'static str {
        match codec {
            AudioCodec::Mp3 => "audio/mpeg",
            AudioCodec::Aac => "audio/mp4",
            AudioCodec::Flac => "audio/flac",
            AudioCodec::Vorbis => "audio/ogg",
            AudioCodec::Opus => "audio/opus",
            AudioCodec::Wav => "audio/wav",
            AudioCodec::Alac => "audio/mp4",
            AudioCodec::Unknown | AudioCodec::Other(_) => "application/octet-stream",
        }
    }
}
