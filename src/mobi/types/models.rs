//! Data structures representing MOBI format components.

use super::error::MobiError;

/// Container flavour, from the 8-byte type/creator tag of the PalmDB
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `"BOOKMOBI"`: a Mobipocket book with a MOBI header in record 0.
    Mobi,
    /// `"TEXtREAd"`: a bare PalmDOC text database.
    PalmDoc,
}

/// Body compression scheme declared in the PalmDOC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Type 1: records hold the body verbatim.
    Raw,
    /// Type 2: run-length coding with 11-bit back-references.
    PalmDoc,
    /// Type 17480: prefix codes over externally supplied dictionaries.
    HuffCdic,
}

impl TryFrom<u16> for Compression {
    type Error = MobiError;
    fn try_from(value: u16) -> Result<Self, MobiError> {
        match value {
            1 => Ok(Self::Raw),
            2 => Ok(Self::PalmDoc),
            17480 => Ok(Self::HuffCdic),
            _ => Err(MobiError::UnsupportedCompression(value)),
        }
    }
}

/// Per-record trailing-data description, decoded from the MOBI header's
/// extra-data flags word.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailerFlags {
    /// Bit 0: each body record ends with a multibyte-character overlap
    /// suffix of `(last byte & 3) + 1` bytes.
    pub multibyte: bool,
    /// Number of size-prefixed trailers on each body record, one per
    /// set bit among bits 1..15.
    pub count: u32,
}

impl TrailerFlags {
    pub fn from_word(flags: u16) -> Self {
        Self {
            multibyte: flags & 1 != 0,
            count: (flags >> 1).count_ones(),
        }
    }
}

/// An embedded image, duplicated out of its container record.
#[derive(Debug, Clone)]
pub struct Image {
    pub data: Vec<u8>,
    /// File extension detected from magic bytes: `.jpg`, `.png`, `.gif`
    /// or `.bin` when the signature is unrecognised.
    pub extension: &'static str,
}

impl Image {
    pub(crate) fn from_record(data: Vec<u8>) -> Self {
        let extension = detect_extension(&data);
        Self { data, extension }
    }
}

fn detect_extension(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF, 0xE0]) {
        ".jpg"
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        ".png"
    } else if data.starts_with(b"GIF8") {
        ".gif"
    } else {
        ".bin"
    }
}
