//! The book assembler: drives the container parser, interprets the
//! record-0 headers and EXTH metadata, configures the decompressors,
//! rebuilds the body and collects the embedded images.

use std::path::Path;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::{debug, info, warn};

use crate::mobi::codec::huffdic::{HuffDicDecompressor, CDICS_MAX};
use crate::mobi::codec::palmdoc;
use crate::mobi::format::exth::{self, ExthMetadata};
use crate::mobi::format::header::{self, MobiHeader, PalmDocHeader, ENCRYPTION_NONE, PALMDOC_HEADER_LEN};
use crate::mobi::format::pdb::{self, PdbFile, RecordTable};
use crate::mobi::format::trailer;
use crate::mobi::source::ByteSource;
use crate::mobi::types::error::{MobiError, Result};
use crate::mobi::types::models::{Compression, ContainerKind, Image, TrailerFlags};

// End-of-file marker record terminating the image span.
const EOF_REC: u32 = 0xE98E_0D0A;

// Known non-image record signatures inside the image span: FLIS, FCIS,
// FDST, DATP, SRCS, VIDE.
const NON_IMAGE_RECS: [u32; 6] = [
    0x464C_4953,
    0x4643_4953,
    0x4644_5354,
    0x4441_5450,
    0x5352_4353,
    0x5649_4445,
];

/// A fully parsed MOBI/PalmDOC book.
///
/// Construction parses the whole file up front; the resulting value
/// owns every buffer it exposes and holds no references into the input.
#[derive(Debug)]
pub struct MobiBook {
    kind: ContainerKind,
    title: Vec<u8>,
    author: Option<Vec<u8>>,
    publisher: Option<Vec<u8>>,
    locale: u32,
    text_encoding: u32,
    doc_type: u32,
    body: Vec<u8>,
    images: Vec<Option<Image>>,
    cover_index: Option<usize>,
}

impl MobiBook {
    /// Opens and parses a book from the given path.
    ///
    /// This is the lenient entry point: a body record that is missing
    /// or fails to decompress is logged and skipped, and a body shorter
    /// than the declared size is truncated to what was produced. Use
    /// [`MobiBook::open_strict`] to turn those diagnostics into errors.
    ///
    /// # Errors
    /// Returns [`MobiError`] if the container framing, the record-0
    /// headers, the EXTH table or the HUFF/CDIC configuration is
    /// invalid, or if the book is DRM-protected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(ByteSource::open(path)?, false)
    }

    /// Like [`MobiBook::open`], but body-record failures and a final
    /// size mismatch abort the parse.
    pub fn open_strict(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(ByteSource::open(path)?, true)
    }

    /// Parses a book already loaded into memory (lenient).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::parse(ByteSource::from_bytes(data), false)
    }

    /// Parses a book already loaded into memory (strict).
    pub fn from_bytes_strict(data: Vec<u8>) -> Result<Self> {
        Self::parse(ByteSource::from_bytes(data), true)
    }

    fn parse(mut source: ByteSource, strict: bool) -> Result<Self> {
        let pdb = pdb::parse(&mut source)?;
        let record0 = pdb.records.read(&mut source, 0)?;
        let is_mobi = pdb.kind == ContainerKind::Mobi;

        let palm = header::parse_palmdoc(&record0, is_mobi)?;
        if is_mobi && palm.encryption != ENCRYPTION_NONE {
            return Err(MobiError::Encrypted(palm.encryption));
        }

        // The PDB name is the fallback title; the MOBI full-name range
        // and an EXTH 503 record each improve on it in turn.
        let mut title = pdb.name.clone();
        let mut meta = ExthMetadata::default();
        let mut mobi_header = None;

        if record0.len() > PALMDOC_HEADER_LEN {
            let mobi = header::parse_mobi(&record0)?;
            if mobi.full_name_len > 0 {
                let start = mobi.full_name_offset as usize;
                let end = start
                    .checked_add(mobi.full_name_len as usize)
                    .filter(|&end| end <= record0.len())
                    .ok_or_else(|| {
                        MobiError::HeaderMalformed(format!(
                            "full name range {}..+{} is outside record 0",
                            mobi.full_name_offset, mobi.full_name_len
                        ))
                    })?;
                title = record0[start..end].to_vec();
            }
            if mobi.has_exth() {
                meta = exth::parse(&record0[mobi.exth_start()..])?;
            }
            mobi_header = Some(mobi);
        }

        if let Some(better) = meta.title.take() {
            title = better;
        }

        let huff = if palm.compression == Compression::HuffCdic {
            Some(Self::configure_huffdic(&mut source, &pdb, mobi_header.as_ref())?)
        } else {
            None
        };

        let (image_first_rec, images_count) = match &mobi_header {
            Some(mobi) => image_span(mobi, pdb.records.count()),
            None => (0, 0),
        };
        let images = load_images(&mut source, &pdb.records, image_first_rec, images_count);
        let cover_index = select_cover(meta.cover_index, &images);

        let trailers = mobi_header
            .as_ref()
            .map(|mobi| mobi.trailers)
            .unwrap_or_default();
        let body = load_body(&mut source, &pdb, &palm, huff.as_ref(), &trailers, strict)?;

        let book = Self {
            kind: pdb.kind,
            title,
            author: meta.author,
            publisher: meta.publisher,
            locale: mobi_header.as_ref().map(|m| m.locale).unwrap_or(0),
            text_encoding: mobi_header
                .as_ref()
                .map(|m| m.text_encoding)
                .unwrap_or(65001),
            doc_type: mobi_header.as_ref().map(|m| m.doc_type).unwrap_or(0),
            body,
            images,
            cover_index,
        };
        info!(
            "book parsed: kind={:?} title={:?} body={} bytes, {} image slots",
            book.kind,
            String::from_utf8_lossy(&book.title),
            book.body.len(),
            book.images.len()
        );
        Ok(book)
    }

    fn configure_huffdic(
        source: &mut ByteSource,
        pdb: &PdbFile,
        mobi: Option<&MobiHeader>,
    ) -> Result<HuffDicDecompressor> {
        let mobi = mobi.ok_or_else(|| {
            MobiError::HeaderMalformed("HUFF compression without a MOBI header".into())
        })?;
        if mobi.huffman_rec_count == 0 {
            return Err(MobiError::HeaderMalformed(
                "HUFF compression with no huffman records".into(),
            ));
        }
        let cdic_count = (mobi.huffman_rec_count - 1) as usize;
        if cdic_count > CDICS_MAX {
            return Err(MobiError::HuffTableCorrupt(format!(
                "{} CDIC records exceed the limit of {}",
                cdic_count, CDICS_MAX
            )));
        }
        let first = mobi.huffman_first_rec as usize;
        let huff_record = pdb.records.read(source, first)?;
        let mut decoder = HuffDicDecompressor::new(&huff_record)?;
        for i in 0..cdic_count {
            let cdic_record = pdb.records.read(source, first + 1 + i)?;
            decoder.add_cdic(&cdic_record)?;
        }
        debug!("huff/cdic decoder configured with {} dictionaries", cdic_count);
        Ok(decoder)
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Book title: EXTH record 503 when present, else the MOBI
    /// full-name range, else the PDB database name. Raw bytes in the
    /// declared text encoding.
    pub fn title(&self) -> &[u8] {
        &self.title
    }

    pub fn author(&self) -> Option<&[u8]> {
        self.author.as_deref()
    }

    pub fn publisher(&self) -> Option<&[u8]> {
        self.publisher.as_deref()
    }

    /// Raw 32-bit locale code from the MOBI header.
    pub fn locale(&self) -> u32 {
        self.locale
    }

    /// Raw declared text encoding code (65001 = UTF-8, 1252 = CP1252).
    pub fn text_encoding(&self) -> u32 {
        self.text_encoding
    }

    /// Document-type code from the MOBI header.
    pub fn doc_type(&self) -> u32 {
        self.doc_type
    }

    /// The full uncompressed body, in the declared text encoding.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Image slots in record order; markers and unreadable records keep
    /// an empty slot so indices line up with `recindex` references.
    pub fn images(&self) -> &[Option<Image>] {
        &self.images
    }

    /// Looks up an image by the 1-based `recindex` attribute used in
    /// MOBI HTML `<img>` tags.
    pub fn image(&self, recindex: usize) -> Option<&Image> {
        if recindex < 1 {
            return None;
        }
        self.images.get(recindex - 1).and_then(Option::as_ref)
    }

    /// 0-based slot of the cover image, when one was selected.
    pub fn cover_index(&self) -> Option<usize> {
        self.cover_index
    }

    pub fn cover(&self) -> Option<&Image> {
        self.cover_index.and_then(|i| self.images[i].as_ref())
    }

    /// The declared text encoding as an `encoding_rs` encoding, when
    /// the code is one this reader knows.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        match self.text_encoding {
            65001 => Some(UTF_8),
            1252 => Some(WINDOWS_1252),
            _ => None,
        }
    }

    pub fn title_lossy(&self) -> String {
        self.decode_lossy(&self.title)
    }

    pub fn author_lossy(&self) -> Option<String> {
        self.author.as_deref().map(|bytes| self.decode_lossy(bytes))
    }

    pub fn publisher_lossy(&self) -> Option<String> {
        self.publisher
            .as_deref()
            .map(|bytes| self.decode_lossy(bytes))
    }

    fn decode_lossy(&self, bytes: &[u8]) -> String {
        // windows-1252 maps every byte, so metadata always renders.
        let encoding = self.encoding().unwrap_or(WINDOWS_1252);
        let (text, _, _) = encoding.decode(bytes);
        text.into_owned()
    }
}

/// First image record and slot count. The span runs to the last content
/// record and is clamped so slots never index past the record table.
fn image_span(mobi: &MobiHeader, num_records: usize) -> (usize, usize) {
    let first = mobi.image_first_rec as usize;
    if first == 0 || first >= num_records {
        return (0, 0);
    }
    let last = mobi.last_content_record as usize;
    if last < first {
        return (first, 0);
    }
    let count = (last - first + 1).min(num_records - first);
    (first, count)
}

fn load_images(
    source: &mut ByteSource,
    records: &RecordTable,
    first: usize,
    count: usize,
) -> Vec<Option<Image>> {
    let mut images: Vec<Option<Image>> = Vec::new();
    images.resize_with(count, || None);
    for (i, slot) in images.iter_mut().enumerate() {
        let data = match records.read(source, first + i) {
            Ok(data) => data,
            Err(err) => {
                warn!("image record {} unreadable: {}", first + i, err);
                continue;
            }
        };
        if data.is_empty() {
            continue;
        }
        if is_eof_record(&data) {
            debug!("image scan stopped at the end-of-file marker (record {})", first + i);
            break;
        }
        if is_known_non_image(&data) {
            continue;
        }
        *slot = Some(Image::from_record(data));
    }
    images
}

// Builds a signature from the first up-to-four bytes.
fn leading_u32(data: &[u8]) -> u32 {
    let mut v = 0u32;
    for &b in data.iter().take(4) {
        v = (v << 8) | u32::from(b);
    }
    v
}

fn is_eof_record(data: &[u8]) -> bool {
    data.len() == 4 && leading_u32(data) == EOF_REC
}

fn is_known_non_image(data: &[u8]) -> bool {
    NON_IMAGE_RECS.contains(&leading_u32(data))
}

/// The EXTH cover index wins when it points at a loaded slot. The
/// fallback picks the larger of the first two loaded images: they are
/// typically the same cover at two resolutions.
fn select_cover(exth_cover: Option<u32>, images: &[Option<Image>]) -> Option<usize> {
    if let Some(index) = exth_cover {
        let index = index as usize;
        if images.get(index).map_or(false, Option::is_some) {
            return Some(index);
        }
        debug!("EXTH cover index {} does not point at a loaded image", index);
    }
    let mut best: Option<(usize, usize)> = None;
    for (i, slot) in images.iter().take(2).enumerate() {
        if let Some(image) = slot {
            if best.map_or(true, |(_, len)| image.data.len() > len) {
                best = Some((i, image.data.len()));
            }
        }
    }
    best.map(|(i, _)| i)
}

fn load_body(
    source: &mut ByteSource,
    pdb: &PdbFile,
    palm: &PalmDocHeader,
    huff: Option<&HuffDicDecompressor>,
    trailers: &TrailerFlags,
    strict: bool,
) -> Result<Vec<u8>> {
    let declared = palm.uncompressed_size as usize;
    let mut body = vec![0u8; declared];
    let mut written = 0usize;
    for rec_no in 1..=palm.record_count as usize {
        match load_body_record(source, pdb, palm, huff, trailers, rec_no, &mut body[written..]) {
            Ok(n) => written += n,
            Err(err) if strict => return Err(err),
            Err(err) => warn!("body record {} skipped: {}", rec_no, err),
        }
    }
    if written != declared {
        if strict {
            return Err(MobiError::SizeMismatch {
                expected: declared,
                found: written,
            });
        }
        warn!("body is {} bytes, header declared {}", written, declared);
    }
    body.truncate(written);
    Ok(body)
}

fn load_body_record(
    source: &mut ByteSource,
    pdb: &PdbFile,
    palm: &PalmDocHeader,
    huff: Option<&HuffDicDecompressor>,
    trailers: &TrailerFlags,
    rec_no: usize,
    dst: &mut [u8],
) -> Result<usize> {
    let record = pdb.records.read(source, rec_no)?;
    let strip = trailer::trailing_len(&record, trailers)?;
    let data = &record[..record.len() - strip];
    match palm.compression {
        Compression::Raw => {
            if data.len() > dst.len() {
                return Err(MobiError::DecompressionOverflow);
            }
            dst[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
        Compression::PalmDoc => palmdoc::uncompress(data, dst),
        Compression::HuffCdic => {
            // Configured earlier in the parse whenever the compression
            // type calls for it.
            let huff = huff.ok_or_else(|| {
                MobiError::HeaderMalformed("HUFF compression without huffman records".into())
            })?;
            huff.decompress(data, dst)
        }
    }
}
