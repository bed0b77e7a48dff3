//! # MP3 Seek Metadata
//!
//! Reads the VBR headers an encoder places in the first MPEG frame:
//!
//! - **Xing / Info**: frame and byte counts, a 100-entry TOC, and the LAME
//!   extension carrying encoder delay and padding.
//! - **VBRI** (Fraunhofer): frame and byte counts and a per-segment size table.
//!
//! Leading ID3v2 tags and a trailing ID3v1 tag are excluded from the audio
//! range.

use bridge_traits::source::{read_fully, ByteSource};
use std::io::SeekFrom;
use tracing::debug;

use super::id3::{has_id3v1, id3v2_tag_size, ID3V1_TAG_LEN, ID3V2_HEADER_LEN};
use super::mpeg::{find_frame_sync, FrameHeader, HEADER_LEN};
use crate::error::Result;
use crate::gapless::GaplessInfo;
use crate::seek_table::{SeekTableEntry, VbrSeekTable};
use crate::traits::SeekMetadataProvider;

/// Bytes read after the ID3v2 tag when looking for the first frame.
const PROBE_LEN: usize = 8192;

const XING_FRAMES: u32 = 0x01;
const XING_BYTES: u32 = 0x02;
const XING_TOC: u32 = 0x04;
const XING_QUALITY: u32 = 0x08;

/// VBRI sits at a fixed offset after a 32-byte side info block.
const VBRI_OFFSET: usize = HEADER_LEN + 32;
const VBRI_HEADER_LEN: usize = 26;

/// Xing or Info header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XingHeader {
    /// `Info` marks a constant bitrate stream.
    pub is_info: bool,
    /// Audio frames, excluding this header frame.
    pub frames: Option<u32>,
    /// Stream bytes, including this header frame.
    pub bytes: Option<u32>,
    pub toc: Option<[u8; 100]>,
    pub quality: Option<u32>,
    pub lame: Option<LameTag>,
}

/// LAME extension of a Xing/Info header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LameTag {
    pub encoder: String,
    pub encoder_delay: u16,
    pub padding: u16,
}

/// Fraunhofer VBRI header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbriHeader {
    pub version: u16,
    pub delay: u16,
    pub quality: u16,
    pub bytes: u32,
    pub frames: u32,
    pub frames_per_entry: u16,
    /// Byte size of each TOC segment, already scaled.
    pub segments: Vec<u64>,
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let b = bytes.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse a Xing/Info header from `frame`, which starts at the frame header.
pub fn parse_xing(frame: &[u8], header: &FrameHeader) -> Option<XingHeader> {
    let start = HEADER_LEN + header.side_info_len();
    let is_info = match frame.get(start..start + 4)? {
        b"Xing" => false,
        b"Info" => true,
        _ => return None,
    };

    let flags = be_u32(frame, start + 4)?;
    let mut pos = start + 8;

    let mut frames = None;
    if flags & XING_FRAMES != 0 {
        frames = Some(be_u32(frame, pos)?);
        pos += 4;
    }
    let mut bytes = None;
    if flags & XING_BYTES != 0 {
        bytes = Some(be_u32(frame, pos)?);
        pos += 4;
    }
    let mut toc = None;
    if flags & XING_TOC != 0 {
        let mut table = [0u8; 100];
        table.copy_from_slice(frame.get(pos..pos + 100)?);
        toc = Some(table);
        pos += 100;
    }
    let mut quality = None;
    if flags & XING_QUALITY != 0 {
        quality = Some(be_u32(frame, pos)?);
        pos += 4;
    }

    Some(XingHeader {
        is_info,
        frames,
        bytes,
        toc,
        quality,
        lame: frame.get(pos..).and_then(parse_lame),
    })
}

/// Parse the LAME extension at the start of `bytes`.
///
/// Delay and padding are two 12-bit values packed into 3 bytes at offset 21.
pub fn parse_lame(bytes: &[u8]) -> Option<LameTag> {
    let version = bytes.get(..9)?;
    if !(version.starts_with(b"LAME") || version.starts_with(b"Lavf") || version.starts_with(b"Lavc"))
    {
        return None;
    }

    let packed = bytes.get(21..24)?;
    let encoder_delay = ((packed[0] as u16) << 4) | ((packed[1] as u16) >> 4);
    let padding = (((packed[1] as u16) & 0x0F) << 8) | packed[2] as u16;

    Some(LameTag {
        encoder: String::from_utf8_lossy(version)
            .trim_end_matches(['\0', ' '])
            .to_string(),
        encoder_delay,
        padding,
    })
}

/// Parse a VBRI header from `frame`, which starts at the frame header.
pub fn parse_vbri(frame: &[u8]) -> Option<VbriHeader> {
    if frame.get(VBRI_OFFSET..VBRI_OFFSET + 4)? != b"VBRI" {
        return None;
    }
    let at = |field: usize| VBRI_OFFSET + field;

    let entries = be_u16(frame, at(18))? as usize;
    let scale = be_u16(frame, at(20))? as u64;
    let entry_bytes = be_u16(frame, at(22))? as usize;
    if !(1..=4).contains(&entry_bytes) {
        return None;
    }

    let toc_start = at(VBRI_HEADER_LEN);
    let toc = frame.get(toc_start..toc_start + entries * entry_bytes)?;
    let segments = toc
        .chunks_exact(entry_bytes)
        .map(|entry| entry.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64) * scale)
        .collect();

    Some(VbriHeader {
        version: be_u16(frame, at(4))?,
        delay: be_u16(frame, at(6))?,
        quality: be_u16(frame, at(8))?,
        bytes: be_u32(frame, at(10))?,
        frames: be_u32(frame, at(14))?,
        frames_per_entry: be_u16(frame, at(24))?,
        segments,
    })
}

/// Seek and gapless metadata read from the head and tail of an MP3 stream.
#[derive(Debug, Clone, Default)]
pub struct Mp3SeekMetadata {
    audio_start: u64,
    audio_end: Option<u64>,
    header: Option<FrameHeader>,
    xing: Option<XingHeader>,
    vbri: Option<VbriHeader>,
    table: Option<VbrSeekTable>,
    gapless: Option<GaplessInfo>,
}

impl Mp3SeekMetadata {
    /// Read metadata from `source` and rewind it to offset 0.
    ///
    /// A stream without VBR headers still yields the audio range; only a
    /// failing source is an error.
    pub fn read(source: &mut dyn ByteSource) -> Result<Self> {
        let length = source.length();

        let mut audio_start = 0u64;
        let mut id3 = [0u8; ID3V2_HEADER_LEN];
        loop {
            source.seek(SeekFrom::Start(audio_start))?;
            let n = read_fully(&mut *source, &mut id3)?;
            match id3v2_tag_size(&id3[..n]) {
                Some(size) => audio_start += size,
                None => break,
            }
        }

        source.seek(SeekFrom::Start(audio_start))?;
        let mut probe = vec![0u8; PROBE_LEN];
        let n = read_fully(&mut *source, &mut probe)?;
        probe.truncate(n);

        let mut audio_end = length;
        if let Some(len) = length.filter(|len| *len >= audio_start + ID3V1_TAG_LEN) {
            source.seek(SeekFrom::Start(len - ID3V1_TAG_LEN))?;
            let mut trailer = [0u8; ID3V1_TAG_LEN as usize];
            let n = read_fully(&mut *source, &mut trailer)?;
            if has_id3v1(&trailer[..n]) {
                audio_end = Some(len - ID3V1_TAG_LEN);
            }
        }

        source.seek(SeekFrom::Start(0))?;

        let mut metadata = Self {
            audio_start,
            audio_end,
            ..Default::default()
        };

        let Some((pos, header)) = find_frame_sync(&probe) else {
            debug!(audio_start, "No MPEG frame sync in stream head");
            return Ok(metadata);
        };
        let first_frame = audio_start + pos as u64;
        let frame = &probe[pos..];

        metadata.audio_start = first_frame;
        metadata.header = Some(header);
        metadata.xing = parse_xing(frame, &header);
        metadata.vbri = if metadata.xing.is_none() {
            parse_vbri(frame)
        } else {
            None
        };
        metadata.build(first_frame);

        debug!(
            first_frame,
            audio_end = ?metadata.audio_end,
            xing = metadata.xing.is_some(),
            vbri = metadata.vbri.is_some(),
            gapless = metadata.gapless.is_some(),
            "Read MP3 seek metadata"
        );
        Ok(metadata)
    }

    fn build(&mut self, first_frame: u64) {
        let Some(header) = self.header else {
            return;
        };
        let spf = header.samples_per_frame() as u64;
        let remaining = self.audio_end.map(|end| end.saturating_sub(first_frame));

        if let Some(xing) = &self.xing {
            let stream_bytes = xing.bytes.map(u64::from).or(remaining);
            if let (Some(toc), Some(bytes)) = (&xing.toc, stream_bytes) {
                self.table = Some(VbrSeekTable::from_xing_toc(toc, first_frame, bytes));
            }
            if let (Some(lame), Some(frames)) = (&xing.lame, xing.frames) {
                self.gapless = Some(GaplessInfo::from_encoder_padding(
                    lame.encoder_delay as u64,
                    lame.padding as u64,
                    frames as u64 * spf,
                ));
            }
        } else if let Some(vbri) = &self.vbri {
            self.table = Some(VbrSeekTable::from_vbri(
                first_frame,
                vbri.bytes as u64,
                &vbri.segments,
                vbri.frames_per_entry as u64,
                vbri.frames as u64,
            ));
        }
    }

    /// Frames in the stream according to its VBR header.
    pub fn total_frames(&self) -> Option<u64> {
        self.xing
            .as_ref()
            .and_then(|x| x.frames)
            .or(self.vbri.as_ref().map(|v| v.frames))
            .map(u64::from)
    }

    pub fn first_frame_header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    pub fn xing(&self) -> Option<&XingHeader> {
        self.xing.as_ref()
    }

    pub fn vbri(&self) -> Option<&VbriHeader> {
        self.vbri.as_ref()
    }
}

impl SeekMetadataProvider for Mp3SeekMetadata {
    fn seek_points(&self) -> Option<Vec<SeekTableEntry>> {
        self.table
            .as_ref()
            .filter(|table| !table.is_empty())
            .map(|table| table.entries().to_vec())
    }

    fn gapless_info(&self) -> Option<GaplessInfo> {
        self.gapless
    }

    fn duration_ms(&self) -> Option<u64> {
        let header = self.header?;
        let samples = match self.gapless.and_then(|g| g.playable_samples()) {
            Some(playable) => playable,
            None => self.total_frames()? * header.samples_per_frame() as u64,
        };
        Some(samples * 1000 / header.sample_rate as u64)
    }

    fn total_samples(&self) -> Option<u64> {
        let header = self.header?;
        Some(self.total_frames()? * header.samples_per_frame() as u64)
    }

    fn audio_start(&self) -> u64 {
        self.audio_start
    }

    fn audio_end(&self) -> Option<u64> {
        self.audio_end
    }
}
