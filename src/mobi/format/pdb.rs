//! PalmDB container framing: the fixed 78-byte database header and the
//! record-offset table.

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::mobi::source::ByteSource;
use crate::mobi::types::error::{MobiError, Result};
use crate::mobi::types::models::ContainerKind;

/// Fixed size of the PalmDB database header.
pub const PDB_HEADER_LEN: usize = 78;
/// Size of one entry in the record-header array.
pub const PDB_RECORD_HEADER_LEN: usize = 8;

const NAME_LEN: usize = 32;
const TYPE_CREATOR_OFFSET: usize = 60;
const NUM_RECORDS_OFFSET: usize = 76;

const MOBI_TYPE_CREATOR: &[u8; 8] = b"BOOKMOBI";
const PALMDOC_TYPE_CREATOR: &[u8; 8] = b"TEXtREAd";

/// Record offsets from the PDB header, with a synthetic sentinel entry
/// holding the file length so that record `i` spans
/// `offsets[i]..offsets[i + 1]` for every `i`.
#[derive(Debug)]
pub struct RecordTable {
    offsets: Vec<u64>,
}

impl RecordTable {
    /// Number of real records; the sentinel is not counted.
    pub fn count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Size in bytes of record `index`.
    pub fn len_of(&self, index: usize) -> usize {
        (self.offsets[index + 1] - self.offsets[index]) as usize
    }

    /// Reads the full payload of record `index`.
    pub fn read(&self, source: &mut ByteSource, index: usize) -> Result<Vec<u8>> {
        if index >= self.count() {
            return Err(MobiError::ContainerMalformed(format!(
                "record {} out of range ({} records)",
                index,
                self.count()
            )));
        }
        source.read_at(self.offsets[index], self.len_of(index))
    }
}

/// Parsed PalmDB container descriptor.
#[derive(Debug)]
pub struct PdbFile {
    /// Database name from the header, NUL padding stripped. For bare
    /// PalmDOC books this is the only title source.
    pub name: Vec<u8>,
    pub kind: ContainerKind,
    pub records: RecordTable,
}

/// Validates the PalmDB framing and builds the record table.
pub fn parse(source: &mut ByteSource) -> Result<PdbFile> {
    let header = source.read_at(0, PDB_HEADER_LEN)?;

    let tag = &header[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8];
    let kind = if tag == MOBI_TYPE_CREATOR {
        ContainerKind::Mobi
    } else if tag == PALMDOC_TYPE_CREATOR {
        ContainerKind::PalmDoc
    } else {
        return Err(MobiError::ContainerMalformed(format!(
            "unknown pdb type/creator {:?}",
            String::from_utf8_lossy(tag)
        )));
    };

    let num_records = BigEndian::read_u16(&header[NUM_RECORDS_OFFSET..]) as usize;
    if num_records < 1 {
        return Err(MobiError::ContainerMalformed("container has no records".into()));
    }

    let table = source.read_at(PDB_HEADER_LEN as u64, num_records * PDB_RECORD_HEADER_LEN)?;
    let mut offsets = Vec::with_capacity(num_records + 1);
    for i in 0..num_records {
        offsets.push(u64::from(BigEndian::read_u32(
            &table[i * PDB_RECORD_HEADER_LEN..],
        )));
    }
    // Sentinel entry, so `offset[i + 1] - offset[i]` covers the last
    // record too.
    offsets.push(source.len());

    let data_start = (PDB_HEADER_LEN + num_records * PDB_RECORD_HEADER_LEN) as u64;
    if offsets[0] < data_start {
        return Err(MobiError::ContainerMalformed(format!(
            "first record offset {} overlaps the {}-byte header area",
            offsets[0], data_start
        )));
    }
    for i in 0..num_records {
        if offsets[i + 1] < offsets[i] {
            return Err(MobiError::ContainerMalformed(format!(
                "record offsets are not monotonic at record {}",
                i
            )));
        }
    }

    let name_end = header[..NAME_LEN]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(NAME_LEN);
    let name = header[..name_end].to_vec();

    debug!(
        "pdb container: kind={:?} records={} name={:?}",
        kind,
        num_records,
        String::from_utf8_lossy(&name)
    );

    Ok(PdbFile {
        name,
        kind,
        records: RecordTable { offsets },
    })
}
