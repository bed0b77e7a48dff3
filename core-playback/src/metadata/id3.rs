//! ID3 tag boundaries. Only tag lengths are read so audio can be located;
//! tag contents are left to a metadata library.

/// Size of an ID3v2 header (and footer).
pub const ID3V2_HEADER_LEN: usize = 10;

/// Size of a trailing ID3v1 tag.
pub const ID3V1_TAG_LEN: u64 = 128;

/// Total length of the ID3v2 tag starting at `header`, including its header
/// and optional footer. `None` if `header` is not an ID3v2 header.
pub fn id3v2_tag_size(header: &[u8]) -> Option<u64> {
    let header = header.get(..ID3V2_HEADER_LEN)?;
    if &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
        return None;
    }

    let size = syncsafe_u32(&header[6..10])?;
    let footer = if header[5] & 0x10 != 0 {
        ID3V2_HEADER_LEN as u64
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN as u64 + size as u64 + footer)
}

/// Whether `trailer` (the last 128 bytes of a file) is an ID3v1 tag.
pub fn has_id3v1(trailer: &[u8]) -> bool {
    trailer.len() as u64 >= ID3V1_TAG_LEN && trailer.starts_with(b"TAG")
}

fn syncsafe_u32(bytes: &[u8]) -> Option<u32> {
    bytes.iter().try_fold(0u32, |acc, &b| {
        if b & 0x80 != 0 {
            None
        } else {
            Some((acc << 7) | b as u32)
        }
    })
}
