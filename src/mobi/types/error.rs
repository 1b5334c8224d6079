//! Custom error types for the mobi-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum MobiError {
    /// An error originating from I/O operations, including reads that
    /// would cross the end of the input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The PalmDB framing is invalid: unknown type/creator tag, zero
    /// records, non-monotonic record offsets, or a truncated record.
    #[error("malformed container: {0}")]
    ContainerMalformed(String),

    /// The PalmDOC header declares a compression scheme other than
    /// raw (1), PalmDOC (2) or HUFF/CDIC (17480).
    #[error("unsupported compression type {0}")]
    UnsupportedCompression(u16),

    /// The book is DRM-protected. Decryption is out of scope; the raw
    /// encryption code from the header is carried for the caller.
    #[error("book is encrypted (encryption type {0})")]
    Encrypted(u16),

    /// A MOBI, EXTH, HUFF or CDIC header is missing its tag or declares
    /// an impossible length.
    #[error("malformed header: {0}")]
    HeaderMalformed(String),

    /// The HUFF cache/base tables or a CDIC dictionary reference data
    /// that cannot exist: zero code lengths, out-of-range dictionary
    /// indices or offsets, code lengths past 32 bits.
    #[error("corrupt HUFF/CDIC table: {0}")]
    HuffTableCorrupt(String),

    /// The compressed stream itself is broken: a truncated literal run
    /// or escape pair, a back-reference before the start of the output,
    /// or a trailer larger than its record.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Decompression produced more bytes than the destination holds.
    #[error("decompression overflowed the destination buffer")]
    DecompressionOverflow,

    /// The assembled body does not match the size declared in the
    /// PalmDOC header. Surfaced only by the strict open path; the
    /// lenient path logs and truncates instead.
    #[error("body size mismatch: expected {expected} bytes, produced {found}")]
    SizeMismatch { expected: usize, found: usize },
}

/// A convenience `Result` type alias using the crate's `MobiError` type.
pub type Result<T> = std::result::Result<T, MobiError>;
