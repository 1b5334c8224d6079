//! Random-access view over the input file.

use std::fs::File;
use std::io::{Error, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::trace;

use crate::mobi::types::error::Result;

enum Backing {
    File(File),
    Memory(Vec<u8>),
}

/// A read-only, seekable view of a PalmDB file.
///
/// Reads that would cross the end of the input fail; partial reads
/// never succeed silently.
pub struct ByteSource {
    backing: Backing,
    len: u64,
}

impl ByteSource {
    /// Opens a file-backed source. The length is taken from file
    /// metadata once; the file is not expected to change underneath.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            backing: Backing::File(file),
            len,
        })
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            backing: Backing::Memory(data),
            len,
        }
    }

    /// Total input length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads exactly `count` bytes starting at `offset`.
    pub fn read_at(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        trace!("read_at offset={} count={}", offset, count);
        if offset
            .checked_add(count as u64)
            .map_or(true, |end| end > self.len)
        {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} crosses the end of the {}-byte input",
                    count, offset, self.len
                ),
            )
            .into());
        }
        let mut buf = vec![0u8; count];
        match &mut self.backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf)?;
            }
            Backing::Memory(data) => {
                let start = offset as usize;
                buf.copy_from_slice(&data[start..start + count]);
            }
        }
        Ok(buf)
    }
}
