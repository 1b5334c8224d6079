//! Reader for electronic books in the MOBI/PalmDOC container family.
//!
//! Given a `.mobi`/`.prc`/`.pdb` file this crate validates the PalmDB
//! framing, parses the PalmDOC and MOBI headers plus the optional EXTH
//! metadata table, reconstructs the uncompressed body text (raw, PalmDOC
//! run-length or HUFF/CDIC compression) and collects embedded images
//! with cover selection.
//!
//! ```no_run
//! use mobi_reader::MobiBook;
//!
//! # fn main() -> mobi_reader::Result<()> {
//! let book = MobiBook::open("book.mobi")?;
//! println!("{} by {}", book.title_lossy(), book.author_lossy().unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! The reader is strictly read-only and rejects DRM-protected files up
//! front. The body is exposed as raw bytes in the book's declared text
//! encoding; transcoding is left to the caller.

pub mod mobi;

pub use mobi::{
    ByteSource, Compression, ContainerKind, Image, MobiBook, MobiError, Result, TrailerFlags,
};
