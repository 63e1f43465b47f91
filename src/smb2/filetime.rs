//! Windows FILETIME encoding.
//! MS-DTYP Section 2.3.3
//!
//! 100-nanosecond ticks since 1601-01-01 UTC, stored as little-endian low and
//! high 32-bit halves. An all-zero value means "no time" and maps to `None`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BufMut;

use super::wire::get_u32;

/// Windows FILETIME epoch offset from Unix epoch (100-ns intervals).
pub const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

const TICKS_PER_SECOND: u64 = 10_000_000;

/// Convert a SystemTime to FILETIME ticks. Times before 1601 clamp to 1601.
pub fn to_filetime(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => FILETIME_UNIX_DIFF.saturating_add((d.as_nanos() / 100) as u64),
        Err(e) => {
            let before = (e.duration().as_nanos() / 100) as u64;
            FILETIME_UNIX_DIFF.saturating_sub(before)
        }
    }
}

/// Convert FILETIME ticks to a SystemTime. Zero is the "no time" sentinel.
pub fn from_filetime(ticks: u64) -> Option<SystemTime> {
    if ticks == 0 {
        return None;
    }
    if ticks >= FILETIME_UNIX_DIFF {
        let since_unix = ticks - FILETIME_UNIX_DIFF;
        UNIX_EPOCH.checked_add(ticks_to_duration(since_unix))
    } else {
        UNIX_EPOCH.checked_sub(ticks_to_duration(FILETIME_UNIX_DIFF - ticks))
    }
}

fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::new(ticks / TICKS_PER_SECOND, (ticks % TICKS_PER_SECOND) as u32 * 100)
}

/// Read an 8-byte FILETIME from `b` at `off`.
pub fn get_time(b: &[u8], off: usize) -> Option<SystemTime> {
    let low = get_u32(b, off) as u64;
    let high = get_u32(b, off + 4) as u64;
    from_filetime(high << 32 | low)
}

/// Write an 8-byte FILETIME to `b` at `off`. `None` writes zero.
pub fn put_time(b: &mut [u8], off: usize, t: Option<SystemTime>) {
    let ticks = t.map(to_filetime).unwrap_or(0);
    (&mut b[off..]).put_u64_le(ticks);
}
