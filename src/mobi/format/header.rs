//! PalmDOC and MOBI headers from record 0.

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::mobi::types::error::{MobiError, Result};
use crate::mobi::types::models::{Compression, TrailerFlags};

/// Fixed size of the PalmDOC header at the start of record 0.
pub const PALMDOC_HEADER_LEN: usize = 16;

/// "Not encrypted" in the MOBI flavour of the PalmDOC header; the other
/// known codes are 1 (old scheme) and 2 (new scheme).
pub const ENCRYPTION_NONE: u16 = 0;

#[derive(Debug)]
pub struct PalmDocHeader {
    pub compression: Compression,
    pub uncompressed_size: u32,
    pub record_count: u16,
    pub max_record_size: u16,
    /// Encryption scheme; only meaningful for MOBI containers.
    pub encryption: u16,
}

/// Parses the 16-byte PalmDOC header.
///
/// The final word pair is overloaded: MOBI containers store the
/// encryption type there, bare PalmDOC stores a reading position this
/// reader ignores.
pub fn parse_palmdoc(record0: &[u8], is_mobi: bool) -> Result<PalmDocHeader> {
    if record0.len() < PALMDOC_HEADER_LEN {
        return Err(MobiError::ContainerMalformed(format!(
            "record 0 is {} bytes, expected at least {}",
            record0.len(),
            PALMDOC_HEADER_LEN
        )));
    }
    let compression = Compression::try_from(BigEndian::read_u16(&record0[0..2]))?;
    let uncompressed_size = BigEndian::read_u32(&record0[4..8]);
    let record_count = BigEndian::read_u16(&record0[8..10]);
    let max_record_size = BigEndian::read_u16(&record0[10..12]);
    let encryption = if is_mobi {
        BigEndian::read_u16(&record0[12..14])
    } else {
        ENCRYPTION_NONE
    };
    debug!(
        "palmdoc header: compression={:?} doc_size={} records={}",
        compression, uncompressed_size, record_count
    );
    Ok(PalmDocHeader {
        compression,
        uncompressed_size,
        record_count,
        max_record_size,
        encryption,
    })
}

/// Fields consumed from the MOBI header.
///
/// Offsets are relative to the `"MOBI"` tag; fields past the declared
/// header length read as zero rather than picking up whatever follows
/// the header in record 0.
#[derive(Debug)]
pub struct MobiHeader {
    pub header_len: u32,
    /// Document-type code (2 = Mobipocket book, 3 = PalmDOC book, ...).
    pub doc_type: u32,
    /// Declared text encoding (65001 = UTF-8, 1252 = CP1252).
    pub text_encoding: u32,
    pub unique_id: u32,
    pub format_version: u32,
    /// Byte range of the full book name inside record 0.
    pub full_name_offset: u32,
    pub full_name_len: u32,
    /// Low byte is the main language, next byte the dialect; US English
    /// is 1033, UK English 2057.
    pub locale: u32,
    pub image_first_rec: u32,
    pub huffman_first_rec: u32,
    pub huffman_rec_count: u32,
    pub exth_flags: u32,
    pub first_content_record: u16,
    pub last_content_record: u16,
    pub trailers: TrailerFlags,
}

impl MobiHeader {
    /// Record-0 offset of the EXTH table, right after this header.
    pub fn exth_start(&self) -> usize {
        PALMDOC_HEADER_LEN + self.header_len as usize
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & 0x40 != 0
    }
}

/// Parses the MOBI header that follows the PalmDOC header in record 0.
pub fn parse_mobi(record0: &[u8]) -> Result<MobiHeader> {
    let rest = &record0[PALMDOC_HEADER_LEN..];
    if rest.len() < 8 {
        return Err(MobiError::HeaderMalformed(format!(
            "record 0 leaves {} bytes for the MOBI header, expected at least 8",
            rest.len()
        )));
    }
    if &rest[0..4] != b"MOBI" {
        return Err(MobiError::HeaderMalformed("MOBI header tag is not 'MOBI'".into()));
    }
    let header_len = BigEndian::read_u32(&rest[4..8]);
    if header_len as usize > rest.len() {
        return Err(MobiError::HeaderMalformed(format!(
            "declared MOBI header length {} exceeds the {} bytes left in record 0",
            header_len,
            rest.len()
        )));
    }
    let hdr = &rest[..header_len as usize];

    // Trailer flags only exist in headers of at least 228 bytes
    // (Mobipocket format 5 and later).
    let trailer_word = if header_len >= 228 {
        read_u16_or_zero(hdr, 226)
    } else {
        0
    };

    let header = MobiHeader {
        header_len,
        doc_type: read_u32_or_zero(hdr, 8),
        text_encoding: read_u32_or_zero(hdr, 12),
        unique_id: read_u32_or_zero(hdr, 16),
        format_version: read_u32_or_zero(hdr, 20),
        full_name_offset: read_u32_or_zero(hdr, 68),
        full_name_len: read_u32_or_zero(hdr, 72),
        locale: read_u32_or_zero(hdr, 76),
        image_first_rec: read_u32_or_zero(hdr, 92),
        huffman_first_rec: read_u32_or_zero(hdr, 96),
        huffman_rec_count: read_u32_or_zero(hdr, 100),
        exth_flags: read_u32_or_zero(hdr, 112),
        first_content_record: read_u16_or_zero(hdr, 176),
        last_content_record: read_u16_or_zero(hdr, 178),
        trailers: TrailerFlags::from_word(trailer_word),
    };
    debug!(
        "mobi header: len={} encoding={} locale={} exth={}",
        header.header_len,
        header.text_encoding,
        header.locale,
        header.has_exth()
    );
    Ok(header)
}

fn read_u32_or_zero(data: &[u8], offset: usize) -> u32 {
    data.get(offset..offset + 4)
        .map(BigEndian::read_u32)
        .unwrap_or(0)
}

fn read_u16_or_zero(data: &[u8], offset: usize) -> u16 {
    data.get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .unwrap_or(0)
}
