//! End-to-end scenarios over synthetic books built in memory.

use mobi_reader::{ContainerKind, MobiBook, MobiError};

const PDB_HEADER_LEN: usize = 78;

/// Builds a complete PalmDB file from a database name, type/creator tag
/// and record payloads.
fn build_pdb(name: &str, type_creator: &[u8; 8], records: &[Vec<u8>]) -> Vec<u8> {
    let mut header = vec![0u8; PDB_HEADER_LEN];
    header[..name.len()].copy_from_slice(name.as_bytes());
    header[60..68].copy_from_slice(type_creator);
    header[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = (PDB_HEADER_LEN + records.len() * 8) as u32;
    let mut table = Vec::new();
    for rec in records {
        table.extend_from_slice(&offset.to_be_bytes());
        table.extend_from_slice(&[0u8; 4]);
        offset += rec.len() as u32;
    }

    let mut file = header;
    file.extend_from_slice(&table);
    for rec in records {
        file.extend_from_slice(rec);
    }
    file
}

fn palmdoc_header(compression: u16, doc_size: u32, record_count: u16, encryption: u16) -> Vec<u8> {
    let mut hdr = Vec::with_capacity(16);
    hdr.extend_from_slice(&compression.to_be_bytes());
    hdr.extend_from_slice(&0u16.to_be_bytes());
    hdr.extend_from_slice(&doc_size.to_be_bytes());
    hdr.extend_from_slice(&record_count.to_be_bytes());
    hdr.extend_from_slice(&4096u16.to_be_bytes());
    hdr.extend_from_slice(&encryption.to_be_bytes());
    hdr.extend_from_slice(&0u16.to_be_bytes());
    hdr
}

struct MobiFields {
    tag: [u8; 4],
    header_len: u32,
    text_encoding: u32,
    locale: u32,
    full_name: Vec<u8>,
    image_first_rec: u32,
    huffman_first_rec: u32,
    huffman_rec_count: u32,
    first_content_record: u16,
    last_content_record: u16,
    extra_data_flags: u16,
    exth: Option<Vec<u8>>,
}

impl Default for MobiFields {
    fn default() -> Self {
        Self {
            tag: *b"MOBI",
            header_len: 232,
            text_encoding: 0,
            locale: 0,
            full_name: Vec::new(),
            image_first_rec: 0,
            huffman_first_rec: 0,
            huffman_rec_count: 0,
            first_content_record: 0,
            last_content_record: 0,
            extra_data_flags: 0,
            exth: None,
        }
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Record 0: PalmDOC header, MOBI header, optional EXTH table, then the
/// full book name.
fn build_record0(palm: &[u8], m: &MobiFields) -> Vec<u8> {
    let header_len = m.header_len as usize;
    let mut mobi = vec![0u8; header_len];
    mobi[0..4].copy_from_slice(&m.tag);
    put_u32(&mut mobi, 4, m.header_len);
    put_u32(&mut mobi, 8, 2); // Mobipocket book
    put_u32(&mut mobi, 12, m.text_encoding);
    put_u32(&mut mobi, 76, m.locale);
    put_u32(&mut mobi, 92, m.image_first_rec);
    put_u32(&mut mobi, 96, m.huffman_first_rec);
    put_u32(&mut mobi, 100, m.huffman_rec_count);
    put_u32(&mut mobi, 112, if m.exth.is_some() { 0x40 } else { 0 });
    put_u16(&mut mobi, 176, m.first_content_record);
    put_u16(&mut mobi, 178, m.last_content_record);
    if header_len >= 228 {
        put_u16(&mut mobi, 226, m.extra_data_flags);
    }

    let exth = m.exth.clone().unwrap_or_default();
    put_u32(&mut mobi, 68, (16 + header_len + exth.len()) as u32);
    put_u32(&mut mobi, 72, m.full_name.len() as u32);

    let mut rec0 = palm.to_vec();
    rec0.extend_from_slice(&mobi);
    rec0.extend_from_slice(&exth);
    rec0.extend_from_slice(&m.full_name);
    rec0.extend_from_slice(&[0, 0]);
    rec0
}

fn build_exth(records: &[(u32, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, payload) in records {
        body.extend_from_slice(&kind.to_be_bytes());
        body.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
        body.extend_from_slice(payload);
    }
    let mut exth = Vec::new();
    exth.extend_from_slice(b"EXTH");
    exth.extend_from_slice(&((body.len() + 12) as u32).to_be_bytes());
    exth.extend_from_slice(&(records.len() as u32).to_be_bytes());
    exth.extend_from_slice(&body);
    exth
}

fn huff_record(cache: &[(usize, u32)]) -> Vec<u8> {
    let mut cache_table = [0u32; 256];
    for &(i, v) in cache {
        cache_table[i] = v;
    }
    let mut rec = Vec::with_capacity(24 + 1024 + 256);
    rec.extend_from_slice(b"HUFF");
    for field in [24u32, 24, 24 + 1024, 0, 0] {
        rec.extend_from_slice(&field.to_be_bytes());
    }
    for entry in cache_table {
        rec.extend_from_slice(&entry.to_be_bytes());
    }
    for _ in 0..64 {
        rec.extend_from_slice(&0u32.to_be_bytes());
    }
    rec
}

fn cdic_record(code_len: u32, symbols: &[&[u8]]) -> Vec<u8> {
    let mut dict = vec![0u8; 512];
    for (i, sym) in symbols.iter().enumerate() {
        let offset = dict.len() as u16;
        dict[i * 2..i * 2 + 2].copy_from_slice(&offset.to_be_bytes());
        dict.extend_from_slice(&(0x8000 | sym.len() as u16).to_be_bytes());
        dict.extend_from_slice(sym);
    }
    let mut rec = Vec::new();
    rec.extend_from_slice(b"CDIC");
    rec.extend_from_slice(&16u32.to_be_bytes());
    rec.extend_from_slice(&0u32.to_be_bytes());
    rec.extend_from_slice(&code_len.to_be_bytes());
    rec.extend_from_slice(&dict);
    rec
}

// --- end-to-end scenarios ---

#[test]
fn raw_palmdoc_container_round_trips_the_body() {
    let record0 = palmdoc_header(1, 14, 1, 0);
    let file = build_pdb(
        "Plain Text",
        b"TEXtREAd",
        &[record0, b"Hello, world!\n".to_vec()],
    );
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.kind(), ContainerKind::PalmDoc);
    assert_eq!(book.body(), b"Hello, world!\n");
    assert_eq!(book.title(), b"Plain Text");
    assert!(book.images().is_empty());
    assert!(book.cover().is_none());
}

#[test]
fn palmdoc_compressed_records_decode() {
    // "ABCDEFGH" as literals, a back-reference appending "HHH", then an
    // escape run for a final 'A'.
    let mut rec1: Vec<u8> = b"ABCDEFGH".to_vec();
    rec1.extend_from_slice(&[0x80, 0x08]);
    rec1.extend_from_slice(&[0x01, 0x41]);
    let record0 = palmdoc_header(2, 12, 1, 0);
    let file = build_pdb("Compressed", b"TEXtREAd", &[record0, rec1]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.body(), b"ABCDEFGHHHHA");
}

#[test]
fn exth_metadata_and_cover_selection() {
    let exth = build_exth(&[
        (100, b"Jane Doe"),
        (101, b"ACME Press"),
        (503, b"Real Title"),
        (201, &2u32.to_be_bytes()),
        (999, b"ignored"),
    ]);
    let fields = MobiFields {
        text_encoding: 65001,
        locale: 1033,
        full_name: b"Full Name".to_vec(),
        image_first_rec: 2,
        first_content_record: 1,
        last_content_record: 4,
        exth: Some(exth),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 5, 1, 0), &fields);
    let jpg = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
    let png = vec![0x89, b'P', b'N', b'G', 9, 9];
    let gif = vec![b'G', b'I', b'F', b'8', b'9', b'a'];
    let file = build_pdb(
        "pdb name",
        b"BOOKMOBI",
        &[record0, b"Body.".to_vec(), jpg.clone(), png, gif.clone()],
    );

    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.kind(), ContainerKind::Mobi);
    assert_eq!(book.title(), b"Real Title");
    assert_eq!(book.title_lossy(), "Real Title");
    assert_eq!(book.author(), Some(&b"Jane Doe"[..]));
    assert_eq!(book.publisher(), Some(&b"ACME Press"[..]));
    assert_eq!(book.locale(), 1033);
    assert_eq!(book.text_encoding(), 65001);
    assert_eq!(book.doc_type(), 2);
    assert_eq!(book.body(), b"Body.");

    assert_eq!(book.images().len(), 3);
    assert_eq!(book.cover_index(), Some(2));
    assert_eq!(book.cover().unwrap().data, gif);
    assert_eq!(book.cover().unwrap().extension, ".gif");

    // recindex round-trip: slot 0 is recindex 1.
    assert_eq!(book.image(1).unwrap().data, jpg);
    assert_eq!(book.image(1).unwrap().extension, ".jpg");
    assert_eq!(book.image(2).unwrap().extension, ".png");
    assert!(book.image(0).is_none());
    assert!(book.image(4).is_none());
}

#[test]
fn full_name_is_the_title_without_exth() {
    let fields = MobiFields {
        full_name: b"Full Name".to_vec(),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let file = build_pdb("pdb name", b"BOOKMOBI", &[record0, b"Body".to_vec()]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.title(), b"Full Name");
    assert!(book.author().is_none());
}

#[test]
fn duplicate_author_records_concatenate_in_order() {
    let exth = build_exth(&[(100, b"Jane "), (100, b"Doe")]);
    let fields = MobiFields {
        full_name: b"Authors".to_vec(),
        exth: Some(exth),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let file = build_pdb("x", b"BOOKMOBI", &[record0, b"Body".to_vec()]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.author(), Some(&b"Jane Doe"[..]));
}

#[test]
fn metadata_decodes_via_the_declared_encoding() {
    let exth = build_exth(&[(100, b"Caf\xE9")]);
    let fields = MobiFields {
        text_encoding: 1252,
        full_name: b"Encoded".to_vec(),
        exth: Some(exth),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let file = build_pdb("x", b"BOOKMOBI", &[record0, b"Body".to_vec()]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.author_lossy().unwrap(), "Café");
}

#[test]
fn huffcdic_compressed_body_decodes() {
    // cache[0]: terminal, 8-bit code, symbol 0 of dictionary 0.
    let fields = MobiFields {
        text_encoding: 65001,
        full_name: b"Huffed".to_vec(),
        huffman_first_rec: 2,
        huffman_rec_count: 2,
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(17480, 5, 1, 0), &fields);
    let huff = huff_record(&[(0, 0x88)]);
    let cdic = cdic_record(8, &[b"HELLO"]);
    let file = build_pdb("x", b"BOOKMOBI", &[record0, vec![0x00], huff, cdic]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.body(), b"HELLO");
}

#[test]
fn trailer_flags_strip_record_suffixes() {
    // A 228-byte header is the smallest that carries trailer flags:
    // one size trailer plus the multibyte suffix.
    let fields = MobiFields {
        header_len: 228,
        full_name: b"Trailers".to_vec(),
        extra_data_flags: 0b11,
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let mut rec1 = b"Body".to_vec();
    rec1.push(0x00); // multibyte suffix: (0 & 3) + 1 = 1 byte
    rec1.extend_from_slice(&[0x80, 0x80, 0x80, 0x04]); // 4-byte size trailer
    let file = build_pdb("x", b"BOOKMOBI", &[record0, rec1]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.body(), b"Body");
}

// --- images ---

#[test]
fn eof_marker_stops_image_loading() {
    let fields = MobiFields {
        full_name: b"NoImages".to_vec(),
        image_first_rec: 2,
        first_content_record: 1,
        last_content_record: 3,
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let eof = vec![0xE9, 0x8E, 0x0D, 0x0A];
    let gif = vec![b'G', b'I', b'F', b'8', b'9', b'a'];
    let file = build_pdb("x", b"BOOKMOBI", &[record0, b"Body".to_vec(), eof, gif]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.images().len(), 2);
    assert!(book.images().iter().all(Option::is_none));
    assert!(book.cover().is_none());
}

#[test]
fn cover_falls_back_to_the_larger_of_the_first_two_images() {
    let fields = MobiFields {
        full_name: b"Covers".to_vec(),
        image_first_rec: 2,
        first_content_record: 1,
        last_content_record: 4,
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let small = vec![0xFF, 0xD8, 0xFF, 0xE0, 0];
    let large = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4, 5];
    let flis = b"FLIS....".to_vec();
    let file = build_pdb(
        "x",
        b"BOOKMOBI",
        &[record0, b"Body".to_vec(), small, large, flis],
    );
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.images().len(), 3);
    // The FLIS marker keeps its slot empty.
    assert!(book.images()[2].is_none());
    assert_eq!(book.cover_index(), Some(1));
}

#[test]
fn exth_cover_can_point_at_the_last_image() {
    let exth = build_exth(&[(201, &1u32.to_be_bytes())]);
    let fields = MobiFields {
        full_name: b"LastCover".to_vec(),
        image_first_rec: 2,
        first_content_record: 1,
        last_content_record: 3,
        exth: Some(exth),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let jpg = vec![0xFF, 0xD8, 0xFF, 0xE0, 1];
    let png = vec![0x89, b'P', b'N', b'G', 2];
    let file = build_pdb("x", b"BOOKMOBI", &[record0, b"Body".to_vec(), jpg, png]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert_eq!(book.images().len(), 2);
    assert_eq!(book.cover_index(), Some(1));
    assert_eq!(book.cover().unwrap().extension, ".png");
}

#[test]
fn zero_image_first_record_means_no_images() {
    let fields = MobiFields {
        full_name: b"NoPics".to_vec(),
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 4, 1, 0), &fields);
    let file = build_pdb("x", b"BOOKMOBI", &[record0, b"Body".to_vec()]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert!(book.images().is_empty());
    assert!(book.cover().is_none());
}

// --- malformed input ---

#[test]
fn bad_mobi_tag_is_rejected() {
    let fields = MobiFields {
        tag: *b"MOBX",
        ..MobiFields::default()
    };
    let record0 = build_record0(&palmdoc_header(1, 0, 0, 0), &fields);
    let file = build_pdb("x", b"BOOKMOBI", &[record0]);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::HeaderMalformed(_)));
}

#[test]
fn encrypted_books_are_rejected() {
    let record0 = palmdoc_header(1, 0, 0, 1);
    let file = build_pdb("x", b"BOOKMOBI", &[record0]);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::Encrypted(1)));
}

#[test]
fn unknown_type_creator_is_rejected() {
    let file = build_pdb("x", b"NOTABOOK", &[palmdoc_header(1, 0, 0, 0)]);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::ContainerMalformed(_)));
}

#[test]
fn zero_records_is_rejected() {
    let file = build_pdb("x", b"TEXtREAd", &[]);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::ContainerMalformed(_)));
}

#[test]
fn non_monotonic_offsets_are_rejected() {
    let mut file = build_pdb(
        "x",
        b"TEXtREAd",
        &[palmdoc_header(1, 0, 0, 0), vec![1, 2, 3]],
    );
    // Swap the two record offsets.
    let off0: [u8; 4] = file[78..82].try_into().unwrap();
    let off1: [u8; 4] = file[86..90].try_into().unwrap();
    file[78..82].copy_from_slice(&off1);
    file[86..90].copy_from_slice(&off0);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::ContainerMalformed(_)));
}

#[test]
fn unsupported_compression_is_rejected() {
    let record0 = palmdoc_header(3, 0, 0, 0);
    let file = build_pdb("x", b"TEXtREAd", &[record0]);
    let err = MobiBook::from_bytes(file).unwrap_err();
    assert!(matches!(err, MobiError::UnsupportedCompression(3)));
}

// --- strict vs lenient ---

#[test]
fn lenient_open_truncates_a_short_body() {
    // The header declares 10 bytes but the single record yields 4.
    let record0 = palmdoc_header(1, 10, 1, 0);
    let file = build_pdb("Short", b"TEXtREAd", &[record0, b"Body".to_vec()]);
    let book = MobiBook::from_bytes(file.clone()).unwrap();
    assert_eq!(book.body(), b"Body");

    let err = MobiBook::from_bytes_strict(file).unwrap_err();
    assert!(matches!(
        err,
        MobiError::SizeMismatch {
            expected: 10,
            found: 4
        }
    ));
}

#[test]
fn strict_open_rejects_an_oversized_raw_record() {
    let record0 = palmdoc_header(1, 2, 1, 0);
    let file = build_pdb("Over", b"TEXtREAd", &[record0, b"toolong".to_vec()]);
    let err = MobiBook::from_bytes_strict(file).unwrap_err();
    assert!(matches!(err, MobiError::DecompressionOverflow));
}

#[test]
fn single_record_palmdoc_has_an_empty_body() {
    let record0 = palmdoc_header(1, 0, 0, 0);
    let file = build_pdb("Lonely", b"TEXtREAd", &[record0]);
    let book = MobiBook::from_bytes(file).unwrap();
    assert!(book.body().is_empty());
    assert_eq!(book.title(), b"Lonely");
}
