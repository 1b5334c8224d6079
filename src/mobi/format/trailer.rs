//! Per-record trailing-data sizing.
//!
//! MOBI body records may carry junk suffixes described by the header's
//! trailer flags; they must be dropped before decompression.

use crate::mobi::types::error::{MobiError, Result};
use crate::mobi::types::models::TrailerFlags;

/// Number of bytes to drop from the end of a body record.
///
/// Each size-prefixed trailer encodes its size in the record's last
/// four visible bytes: every byte contributes its low 7 bits, but a set
/// high bit restarts accumulation, so only the trailing run counts.
/// The multibyte flag then drops a further `(last byte & 3) + 1` bytes.
pub fn trailing_len(record: &[u8], flags: &TrailerFlags) -> Result<usize> {
    let mut visible = record.len();
    for _ in 0..flags.count {
        if visible < 4 {
            return Err(MobiError::Decompression(format!(
                "record too short ({} bytes) for its trailer size field",
                visible
            )));
        }
        let mut n: usize = 0;
        for &v in &record[visible - 4..visible] {
            if v & 0x80 != 0 {
                n = 0;
            }
            n = (n << 7) | (v & 0x7F) as usize;
        }
        if n >= visible {
            return Err(MobiError::Decompression(format!(
                "trailer of {} bytes exceeds the {} visible bytes of its record",
                n, visible
            )));
        }
        visible -= n;
    }
    if flags.multibyte {
        if visible == 0 {
            return Err(MobiError::Decompression(
                "record has no room for its multibyte suffix".into(),
            ));
        }
        let m = (record[visible - 1] & 3) as usize + 1;
        if visible < m {
            return Err(MobiError::Decompression(format!(
                "multibyte suffix of {} bytes exceeds the {} visible bytes of its record",
                m, visible
            )));
        }
        visible -= m;
    }
    Ok(record.len() - visible)
}
