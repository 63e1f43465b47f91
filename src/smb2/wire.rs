//! Little-endian field access and UTF-16LE string conversion.
//!
//! Every SMB2 structure is read in place through these helpers; writes go
//! through `bytes::BufMut` on a sub-slice starting at the field offset.
//! Offsets are absolute within the slice handed in; callers are expected to
//! have checked the slice length first, so an out-of-range offset is a
//! programming error and panics.

pub fn get_u16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

pub fn get_u32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

pub fn get_u64(b: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(raw)
}

/// Round `n` up to the next multiple of 8.
pub fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Decode a UTF-16LE byte slice into a Rust String.
///
/// Unpaired surrogates become U+FFFD. A trailing odd byte is ignored, as are
/// trailing NULs.
pub fn utf16le_to_string(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));
    let s: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    s.trim_end_matches('\0').to_string()
}

/// Encode a Rust string as UTF-16LE bytes.
pub fn string_to_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect()
}
