//! EXTH extended-metadata table.

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::mobi::types::error::{MobiError, Result};

const EXTH_HEADER_LEN: usize = 12;
const EXTH_RECORD_HEADER_LEN: usize = 8;

// Record type codes this reader consumes.
const EXTH_AUTHOR: u32 = 100;
const EXTH_PUBLISHER: u32 = 101;
const EXTH_COVER_INDEX: u32 = 201;
const EXTH_UPDATED_TITLE: u32 = 503;

/// Metadata harvested from an EXTH table.
///
/// Strings are raw byte ranges in the book's declared text encoding;
/// embedded NULs are preserved.
#[derive(Debug, Default)]
pub struct ExthMetadata {
    /// Concatenation of every type-100 record, in table order.
    pub author: Option<Vec<u8>>,
    pub publisher: Option<Vec<u8>>,
    /// Type 503; a better title than the header full-name when present.
    pub title: Option<Vec<u8>>,
    /// Type 201; 0-based index into the image records.
    pub cover_index: Option<u32>,
}

/// Walks an EXTH table. `data` starts at the `"EXTH"` tag and extends
/// to the end of record 0. Unknown record types are skipped.
pub fn parse(data: &[u8]) -> Result<ExthMetadata> {
    if data.len() < EXTH_HEADER_LEN {
        return Err(MobiError::HeaderMalformed(format!(
            "EXTH table truncated at {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != b"EXTH" {
        return Err(MobiError::HeaderMalformed("EXTH header tag is not 'EXTH'".into()));
    }
    let record_count = BigEndian::read_u32(&data[8..12]);

    let mut meta = ExthMetadata::default();
    let mut pos = EXTH_HEADER_LEN;
    for _ in 0..record_count {
        let header = data
            .get(pos..pos + EXTH_RECORD_HEADER_LEN)
            .ok_or_else(|| MobiError::HeaderMalformed("EXTH record header overruns record 0".into()))?;
        let kind = BigEndian::read_u32(&header[0..4]);
        // `len` counts the 8-byte record header too.
        let len = BigEndian::read_u32(&header[4..8]) as usize;
        if len < EXTH_RECORD_HEADER_LEN {
            return Err(MobiError::HeaderMalformed(format!(
                "EXTH record length {} is shorter than its own header",
                len
            )));
        }
        let payload = data
            .get(pos + EXTH_RECORD_HEADER_LEN..pos + len)
            .ok_or_else(|| MobiError::HeaderMalformed("EXTH record payload overruns record 0".into()))?;

        match kind {
            EXTH_AUTHOR => meta
                .author
                .get_or_insert_with(Vec::new)
                .extend_from_slice(payload),
            EXTH_PUBLISHER => meta
                .publisher
                .get_or_insert_with(Vec::new)
                .extend_from_slice(payload),
            EXTH_COVER_INDEX => {
                if payload.len() >= 4 {
                    meta.cover_index = Some(BigEndian::read_u32(&payload[0..4]));
                }
            }
            EXTH_UPDATED_TITLE => meta.title = Some(payload.to_vec()),
            other => trace!("skipping EXTH record type {} ({} bytes)", other, payload.len()),
        }
        pos += len;
    }
    Ok(meta)
}
