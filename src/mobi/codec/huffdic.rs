//! HUFF/CDIC prefix-code dictionary decompressor.
//!
//! The scheme spans two record kinds: a single HUFF record carrying a
//! 256-entry cache table and a 64-entry base table for canonical prefix
//! codes, and up to 32 CDIC records each carrying a dictionary of
//! symbols. A decoded code selects a dictionary and a symbol inside it;
//! symbols are either literal byte runs or themselves HUFF-compressed.
//!
//! The tables are parsed into owned arrays up front so decoding only
//! ever indexes validated, native-endian data.

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::mobi::codec::bits::BitReader;
use crate::mobi::types::error::{MobiError, Result};

const HUFF_HEADER_LEN: usize = 24;
const CACHE_ENTRIES: usize = 256;
const BASE_ENTRIES: usize = 64;
const CDIC_HEADER_LEN: usize = 16;

/// Upper bound on CDIC dictionaries per book.
pub const CDICS_MAX: usize = 32;

/// Nested compressed symbols recurse through `decompress`; a crafted
/// dictionary can form a cycle, so depth is capped.
const MAX_SYMBOL_DEPTH: u32 = 32;

/// Decoder state for HUFF/CDIC-compressed body records.
#[derive(Debug)]
pub struct HuffDicDecompressor {
    cache: [u32; CACHE_ENTRIES],
    base: [u32; BASE_ENTRIES],
    code_length: u32,
    dicts: Vec<Vec<u8>>,
}

impl HuffDicDecompressor {
    /// Parses the HUFF record: the first phase of configuration.
    ///
    /// The record carries big-endian cache and base tables at fixed
    /// offsets, optionally followed by little-endian duplicates that
    /// this reader ignores.
    pub fn new(huff_record: &[u8]) -> Result<Self> {
        let min_len = HUFF_HEADER_LEN + CACHE_ENTRIES * 4 + BASE_ENTRIES * 4;
        if huff_record.len() < min_len {
            return Err(MobiError::HuffTableCorrupt(format!(
                "HUFF record of {} bytes cannot hold the code tables",
                huff_record.len()
            )));
        }
        if &huff_record[0..4] != b"HUFF" {
            return Err(MobiError::HeaderMalformed("HUFF record tag is not 'HUFF'".into()));
        }
        let hdr_len = BigEndian::read_u32(&huff_record[4..8]) as usize;
        let cache_offset = BigEndian::read_u32(&huff_record[8..12]) as usize;
        let base_offset = BigEndian::read_u32(&huff_record[12..16]) as usize;
        if hdr_len != HUFF_HEADER_LEN
            || cache_offset != HUFF_HEADER_LEN
            || base_offset != cache_offset + CACHE_ENTRIES * 4
        {
            return Err(MobiError::HeaderMalformed(format!(
                "unexpected HUFF layout: hdrLen={} cacheOffset={} baseTableOffset={}",
                hdr_len, cache_offset, base_offset
            )));
        }

        let mut cache = [0u32; CACHE_ENTRIES];
        for (i, entry) in cache.iter_mut().enumerate() {
            *entry = BigEndian::read_u32(&huff_record[cache_offset + i * 4..]);
        }
        let mut base = [0u32; BASE_ENTRIES];
        for (i, entry) in base.iter_mut().enumerate() {
            *entry = BigEndian::read_u32(&huff_record[base_offset + i * 4..]);
        }

        Ok(Self {
            cache,
            base,
            code_length: 0,
            dicts: Vec::new(),
        })
    }

    /// Adds one CDIC dictionary record: the second phase. Every CDIC
    /// record of a book must declare the same code length.
    pub fn add_cdic(&mut self, record: &[u8]) -> Result<()> {
        if record.len() < CDIC_HEADER_LEN {
            return Err(MobiError::HeaderMalformed(format!(
                "CDIC record too short: {} bytes",
                record.len()
            )));
        }
        if &record[0..4] != b"CDIC" {
            return Err(MobiError::HeaderMalformed("CDIC record tag is not 'CDIC'".into()));
        }
        let hdr_len = BigEndian::read_u32(&record[4..8]) as usize;
        if hdr_len != CDIC_HEADER_LEN {
            return Err(MobiError::HeaderMalformed(format!(
                "unexpected CDIC header length {}",
                hdr_len
            )));
        }
        let code_len = BigEndian::read_u32(&record[12..16]);
        if self.code_length != 0 && code_len != self.code_length {
            return Err(MobiError::HuffTableCorrupt(format!(
                "CDIC code length {} disagrees with earlier records ({})",
                code_len, self.code_length
            )));
        }
        if self.dicts.len() == CDICS_MAX {
            return Err(MobiError::HuffTableCorrupt(format!(
                "more than {} CDIC dictionaries",
                CDICS_MAX
            )));
        }

        let dict = &record[CDIC_HEADER_LEN..];
        // The index area alone needs 1 << code_len two-byte entries to
        // be addressable, so anything smaller cannot be decoded from.
        let index_span = 1u64.checked_shl(code_len).unwrap_or(u64::MAX);
        if code_len == 0 || index_span >= dict.len() as u64 {
            return Err(MobiError::HuffTableCorrupt(format!(
                "CDIC dictionary of {} bytes cannot hold a {}-bit code index",
                dict.len(),
                code_len
            )));
        }

        self.code_length = code_len;
        self.dicts.push(dict.to_vec());
        trace!(
            "cdic dictionary {} added: {} bytes, code length {}",
            self.dicts.len(),
            dict.len(),
            code_len
        );
        Ok(())
    }

    /// Decompresses one HUFF-compressed byte sequence into `dst`,
    /// returning the number of bytes written.
    pub fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        self.decompress_at_depth(src, dst, 0)
    }

    fn decompress_at_depth(&self, src: &[u8], dst: &mut [u8], depth: u32) -> Result<usize> {
        if depth > MAX_SYMBOL_DEPTH {
            return Err(MobiError::HuffTableCorrupt(
                "compressed symbols nest too deep".into(),
            ));
        }
        let mut reader = BitReader::new(src);
        let mut consumed = 0usize;
        let mut written = 0usize;
        loop {
            if consumed > reader.bits_left() {
                return Err(MobiError::Decompression(
                    "compressed stream ends inside a code".into(),
                ));
            }
            reader.eat(consumed);
            if reader.bits_left() == 0 {
                break;
            }
            let bits = reader.peek(32);
            // Trailing zero bits in the final byte are padding.
            if reader.bits_left() < 8 && bits == 0 {
                break;
            }

            let v = self.cache[(bits >> 24) as usize];
            let mut code_len = v & 0x1F;
            if code_len == 0 {
                return Err(MobiError::HuffTableCorrupt(
                    "cache entry with zero code length".into(),
                ));
            }

            let code;
            if v & 0x80 != 0 {
                // Terminal fast path: the cache entry carries the base.
                code = (v >> 8).wrapping_sub(bits >> (32 - code_len));
            } else {
                // Grow the code until it clears the base table.
                let mut k = code_len;
                loop {
                    if k > 32 {
                        return Err(MobiError::HuffTableCorrupt(
                            "code length exceeds 32 bits".into(),
                        ));
                    }
                    if self.base[((k - 1) * 2) as usize] <= bits >> (32 - k) {
                        break;
                    }
                    k += 1;
                }
                code = self.base[((k - 1) * 2 + 1) as usize].wrapping_sub(bits >> (32 - k));
                code_len = k;
            }

            self.decode_one(code, dst, &mut written, depth)?;
            consumed = code_len as usize;
        }
        Ok(written)
    }

    /// Decodes a single symbol into `dst` at `written`.
    fn decode_one(&self, code: u32, dst: &mut [u8], written: &mut usize, depth: u32) -> Result<()> {
        let dict_index = (code >> self.code_length) as usize;
        let dict = self.dicts.get(dict_index).ok_or_else(|| {
            MobiError::HuffTableCorrupt(format!(
                "dictionary index {} out of range ({} dictionaries)",
                dict_index,
                self.dicts.len()
            ))
        })?;
        let sym = (code & ((1u32 << self.code_length) - 1)) as usize;
        let offset = read_be_u16(dict, sym * 2)? as usize;
        let sym_len = read_be_u16(dict, offset)?;
        let body = offset + 2;

        if sym_len & 0x8000 == 0 {
            // The symbol is itself HUFF-compressed.
            let len = sym_len as usize;
            if body + len > dict.len() {
                return Err(MobiError::HuffTableCorrupt(format!(
                    "compressed symbol of {} bytes overruns its dictionary",
                    len
                )));
            }
            let n = self.decompress_at_depth(&dict[body..body + len], &mut dst[*written..], depth + 1)?;
            *written += n;
        } else {
            let len = (sym_len & 0x7FFF) as usize;
            if len > 127 {
                return Err(MobiError::HuffTableCorrupt(format!(
                    "literal symbol of {} bytes",
                    len
                )));
            }
            if body + len > dict.len() {
                return Err(MobiError::HuffTableCorrupt(format!(
                    "literal symbol of {} bytes overruns its dictionary",
                    len
                )));
            }
            if *written + len > dst.len() {
                return Err(MobiError::DecompressionOverflow);
            }
            dst[*written..*written + len].copy_from_slice(&dict[body..body + len]);
            *written += len;
        }
        Ok(())
    }
}

fn read_be_u16(dict: &[u8], offset: usize) -> Result<u16> {
    dict.get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .ok_or_else(|| {
            MobiError::HuffTableCorrupt(format!("offset {} is outside its dictionary", offset))
        })
}
