//! Container metadata needed to seek and trim MP3 streams.

pub mod id3;
pub mod mpeg;
pub mod xing;

pub use mpeg::{find_frame_sync, FrameHeader, Layer, MpegVersion};
pub use xing::Mp3SeekMetadata;
