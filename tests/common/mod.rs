//! Byte-level archive builders shared by the integration tests.
//!
//! Each builder produces the exact on-disk layout the parsers expect, so a
//! generate-then-parse round trip exercises every offset computation.

#![allow(dead_code)]

use std::io;

use volmap::{sevenzip::number::write_number, volume::VolumeDescriptor, Concat};

/// A valid DOS datetime: 2023-06-15 12:30:10.
pub const DOS_TIME: u32 = (43 << 25) | (6 << 21) | (15 << 16) | (12 << 11) | (30 << 5) | 5;

pub fn concat_stream(volumes: &[Vec<u8>]) -> Concat<io::Cursor<Vec<u8>>> {
    Concat::new(volumes.iter().map(|v| io::Cursor::new(v.clone())).collect()).unwrap()
}

pub fn concat_bytes(volumes: &[Vec<u8>]) -> Vec<u8> {
    volumes.concat()
}

pub fn descriptors(names: &[&str], volumes: &[Vec<u8>]) -> Vec<VolumeDescriptor> {
    names
        .iter()
        .zip(volumes)
        .map(|(name, volume)| {
            VolumeDescriptor::new(
                *name,
                volume.len() as u64,
                Some(volume[..volume.len().min(16384)].to_vec()),
            )
        })
        .collect()
}

/// Concatenate the bytes an entry points at, whether split or not.
pub fn entry_data(buffer: &[u8], entry: &volmap::RarFileEntry) -> Vec<u8> {
    if entry.split_parts.is_empty() {
        let start = entry.data_position as usize;
        return buffer[start..start + entry.packed_size as usize].to_vec();
    }

    entry
        .split_parts
        .iter()
        .flat_map(|part| {
            let start = part.data_position as usize;
            buffer[start..start + part.data_size as usize].iter().copied()
        })
        .collect()
}

pub fn assert_monotonic(entry: &volmap::RarFileEntry) {
    for pair in entry.split_parts.windows(2) {
        assert!(
            pair[0].data_position + pair[0].data_size <= pair[1].data_position,
            "split parts of {:?} overlap: {:?}",
            entry.path,
            pair
        );
        assert!(pair[0].volume_index <= pair[1].volume_index);
    }
}

// ---------------------------------------------------------------------------
// RAR15

/// One file's presence in one RAR15 volume.
pub struct Rar4File<'a> {
    pub name: &'a str,
    /// The part of the file stored in this volume.
    pub data: &'a [u8],
    /// Size of the whole file across all volumes.
    pub unpacked_size: u64,
    /// CRC32 of the whole file.
    pub crc32: u32,
    pub split_before: bool,
    pub split_after: bool,
    pub directory: bool,
}

impl<'a> Rar4File<'a> {
    pub fn whole(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            unpacked_size: data.len() as u64,
            crc32: crc32fast::hash(data),
            split_before: false,
            split_after: false,
            directory: false,
        }
    }

    pub fn part(name: &'a str, whole: &'a [u8], range: std::ops::Range<usize>) -> Self {
        Self {
            name,
            data: &whole[range.clone()],
            unpacked_size: whole.len() as u64,
            crc32: crc32fast::hash(whole),
            split_before: range.start > 0,
            split_after: range.end < whole.len(),
            directory: false,
        }
    }

    pub fn directory(name: &'a str) -> Self {
        Self {
            name,
            data: &[],
            unpacked_size: 0,
            crc32: 0,
            split_before: false,
            split_after: false,
            directory: true,
        }
    }
}

fn rar4_block(block_type: u8, flags: u16, body: &[u8]) -> Vec<u8> {
    let mut header = vec![block_type];
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&((7 + body.len()) as u16).to_le_bytes());
    header.extend_from_slice(body);

    let crc16 = (crc32fast::hash(&header) & 0xffff) as u16;

    let mut block = crc16.to_le_bytes().to_vec();
    block.extend(header);
    block
}

/// Build one RAR15 volume containing the given file parts.
pub fn rar4_volume(files: &[Rar4File], is_first: bool, is_last: bool) -> Vec<u8> {
    let mut volume = volmap::Signature::RAR15.to_vec();

    // Archive header: reserved AV offset fields, zero in modern archives.
    let main_flags = if is_first { 0x0101 } else { 0x0001 };
    volume.extend(rar4_block(0x73, main_flags, &[0; 6]));

    for file in files {
        let mut body = vec![];
        body.extend_from_slice(&(file.data.len() as u32).to_le_bytes());
        body.extend_from_slice(&(file.unpacked_size as u32).to_le_bytes());
        body.push(2); // host OS: Windows
        body.extend_from_slice(&file.crc32.to_le_bytes());
        body.extend_from_slice(&DOS_TIME.to_le_bytes());
        body.push(20); // unpack version
        body.push(0x30); // method: store
        body.extend_from_slice(&(file.name.len() as u16).to_le_bytes());
        body.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
        body.extend_from_slice(file.name.as_bytes());

        let mut flags = 0x8000; // data area follows
        if file.split_before {
            flags |= 0x0001;
        }
        if file.split_after {
            flags |= 0x0002;
        }
        if file.directory {
            flags |= 0x00e0;
        }

        volume.extend(rar4_block(0x74, flags, &body));
        volume.extend_from_slice(file.data);
    }

    let end_flags = if is_last { 0x0000 } else { 0x0001 };
    volume.extend(rar4_block(0x7b, end_flags, &[]));
    volume
}

/// Split one buffer over several volumes at the given part sizes.
pub fn rar4_split_archive(name: &str, data: &[u8], part_sizes: &[usize]) -> Vec<Vec<u8>> {
    assert_eq!(part_sizes.iter().sum::<usize>(), data.len());

    let count = part_sizes.len();
    let mut volumes = vec![];
    let mut offset = 0;

    for (index, &part) in part_sizes.iter().enumerate() {
        let file = Rar4File::part(name, data, offset..offset + part);
        volumes.push(rar4_volume(&[file], index == 0, index == count - 1));
        offset += part;
    }

    volumes
}

// ---------------------------------------------------------------------------
// RAR50

pub fn write_vint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;

        if value == 0 {
            out.push(byte);
            return;
        }

        out.push(byte | 0x80);
    }
}

fn rar5_block(header_type: u64, data_size: Option<u64>, body: &[u8]) -> Vec<u8> {
    let mut tail = vec![];
    write_vint(&mut tail, header_type);
    write_vint(&mut tail, if data_size.is_some() { 0x0002 } else { 0 });
    if let Some(data_size) = data_size {
        write_vint(&mut tail, data_size);
    }
    tail.extend_from_slice(body);

    let mut sized = vec![];
    write_vint(&mut sized, tail.len() as u64);
    sized.extend(tail);

    let mut block = crc32fast::hash(&sized).to_le_bytes().to_vec();
    block.extend(sized);
    block
}

/// One file's presence in one RAR50 volume.
pub struct Rar5File<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub unpacked_size: u64,
    pub crc32: u32,
    pub compression_method: u64,
    pub modification_time: Option<u32>,
    pub split_before: bool,
    pub split_after: bool,
    pub directory: bool,
}

impl<'a> Rar5File<'a> {
    pub fn whole(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            unpacked_size: data.len() as u64,
            crc32: crc32fast::hash(data),
            compression_method: 0,
            modification_time: None,
            split_before: false,
            split_after: false,
            directory: false,
        }
    }

    pub fn part(name: &'a str, whole: &'a [u8], range: std::ops::Range<usize>) -> Self {
        Self {
            name,
            data: &whole[range.clone()],
            unpacked_size: whole.len() as u64,
            crc32: crc32fast::hash(whole),
            compression_method: 0,
            modification_time: None,
            split_before: range.start > 0,
            split_after: range.end < whole.len(),
            directory: false,
        }
    }
}

/// Build one RAR50 volume containing the given file parts.
///
/// The main header is identical in every volume so that the continuation
/// preamble keeps a fixed size, which is what split inference relies on.
pub fn rar5_volume(files: &[Rar5File]) -> Vec<u8> {
    let mut volume = volmap::Signature::RAR50.to_vec();

    let mut main_body = vec![];
    write_vint(&mut main_body, 0x0001); // archive is a volume
    volume.extend(rar5_block(0x01, None, &main_body));

    for file in files {
        let mut file_flags = 0x0004; // CRC32 present
        if file.directory {
            file_flags |= 0x0001;
        }
        if file.modification_time.is_some() {
            file_flags |= 0x0002;
        }
        if file.split_before {
            file_flags |= 0x0008;
        }
        if file.split_after {
            file_flags |= 0x0010;
        }

        let mut body = vec![];
        write_vint(&mut body, file_flags);
        write_vint(&mut body, file.unpacked_size);
        write_vint(&mut body, 0); // attributes
        if let Some(modification_time) = file.modification_time {
            body.extend_from_slice(&modification_time.to_le_bytes());
        }
        body.extend_from_slice(&file.crc32.to_le_bytes());
        write_vint(&mut body, file.compression_method);
        write_vint(&mut body, 1); // host OS: Unix
        write_vint(&mut body, file.name.len() as u64);
        body.extend_from_slice(file.name.as_bytes());

        volume.extend(rar5_block(0x02, Some(file.data.len() as u64), &body));
        volume.extend_from_slice(file.data);
    }

    let mut end_body = vec![];
    write_vint(&mut end_body, 0);
    volume.extend(rar5_block(0x05, None, &end_body));
    volume
}

/// Split one buffer over several volumes at the given part sizes.
///
/// Keep every part size in the same vint width class (e.g. all in
/// 128..16384); the data-size field lives inside the file header, and
/// split inference assumes continuation headers match the first one.
pub fn rar5_split_archive(name: &str, data: &[u8], part_sizes: &[usize]) -> Vec<Vec<u8>> {
    assert_eq!(part_sizes.iter().sum::<usize>(), data.len());

    let mut volumes = vec![];
    let mut offset = 0;

    for &part in part_sizes {
        let file = Rar5File::part(name, data, offset..offset + part);
        volumes.push(rar5_volume(&[file]));
        offset += part;
    }

    volumes
}

// ---------------------------------------------------------------------------
// 7z

/// One entry of a generated 7z archive; `data: None` makes an empty stream.
pub struct SevenZipEntry<'a> {
    pub name: &'a str,
    pub data: Option<&'a [u8]>,
    pub attributes: Option<u32>,
}

impl<'a> SevenZipEntry<'a> {
    pub fn file(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data: Some(data),
            attributes: None,
        }
    }

    pub fn directory(name: &'a str) -> Self {
        Self {
            name,
            data: None,
            attributes: Some(0x10),
        }
    }

    pub fn empty_file(name: &'a str) -> Self {
        Self {
            name,
            data: None,
            attributes: Some(0x20),
        }
    }
}

const K_HEADER: u8 = 0x01;
const K_MAIN_STREAMS_INFO: u8 = 0x04;
const K_FILES_INFO: u8 = 0x05;
const K_PACK_INFO: u8 = 0x06;
const K_UNPACK_INFO: u8 = 0x07;
const K_SUB_STREAMS_INFO: u8 = 0x08;
const K_SIZE: u8 = 0x09;
const K_CRC: u8 = 0x0a;
const K_FOLDER: u8 = 0x0b;
const K_CODERS_UNPACK_SIZE: u8 = 0x0c;
const K_NUM_UNPACK_STREAM: u8 = 0x0d;
const K_EMPTY_STREAM: u8 = 0x0e;
const K_NAME: u8 = 0x11;
const K_WIN_ATTRIBUTES: u8 = 0x15;
const K_DUMMY: u8 = 0x19;
const K_END: u8 = 0x00;

fn utf16le_names(entries: &[SevenZipEntry]) -> Vec<u8> {
    let mut names = vec![0]; // internal names
    for entry in entries {
        for unit in entry.name.encode_utf16() {
            names.extend_from_slice(&unit.to_le_bytes());
        }
        names.extend_from_slice(&[0, 0]);
    }
    names
}

fn bit_vector(bits: impl Iterator<Item = bool>) -> Vec<u8> {
    let mut out = vec![];
    let mut byte = 0u8;
    let mut mask = 0x80u8;
    let mut used = false;

    for bit in bits {
        if bit {
            byte |= mask;
        }
        used = true;

        mask >>= 1;
        if mask == 0 {
            out.push(byte);
            byte = 0;
            mask = 0x80;
            used = false;
        }
    }

    if used {
        out.push(byte);
    }

    out
}

fn sevenzip_files_info(entries: &[SevenZipEntry]) -> Vec<u8> {
    let mut info = vec![K_FILES_INFO];
    write_number(&mut info, entries.len() as u64);

    if entries.iter().any(|e| e.data.is_none()) {
        let bits = bit_vector(entries.iter().map(|e| e.data.is_none()));
        info.push(K_EMPTY_STREAM);
        write_number(&mut info, bits.len() as u64);
        info.extend(bits);
    }

    let names = utf16le_names(entries);
    info.push(K_NAME);
    write_number(&mut info, names.len() as u64);
    info.extend(names);

    if entries.iter().any(|e| e.attributes.is_some()) {
        let mut property = bit_vector(entries.iter().map(|e| e.attributes.is_some()));
        property.insert(0, 0); // not all defined
        property.push(0); // internal
        for entry in entries {
            if let Some(attributes) = entry.attributes {
                property.extend_from_slice(&attributes.to_le_bytes());
            }
        }

        info.push(K_WIN_ATTRIBUTES);
        write_number(&mut info, property.len() as u64);
        info.extend(property);
    }

    // An opaque padding property; the parser must skip it by its size.
    info.push(K_DUMMY);
    write_number(&mut info, 4);
    info.extend_from_slice(&[0; 4]);

    info.push(K_END);
    info
}

pub fn sevenzip_assemble(packed: Vec<u8>, metadata: Vec<u8>) -> Vec<u8> {
    let mut archive = volmap::Signature::SEVEN_ZIP.to_vec();
    archive.extend_from_slice(&[0, 4]); // format version

    let mut start_header = (packed.len() as u64).to_le_bytes().to_vec(); // next header offset
    start_header.extend_from_slice(&(metadata.len() as u64).to_le_bytes());
    start_header.extend_from_slice(&crc32fast::hash(&metadata).to_le_bytes());

    archive.extend_from_slice(&crc32fast::hash(&start_header).to_le_bytes());
    archive.extend(start_header);
    archive.extend(packed);
    archive.extend(metadata);
    archive
}

fn sevenzip_archive_with_codec(entries: &[SevenZipEntry], codec_id: u8) -> Vec<u8> {
    let files: Vec<&SevenZipEntry> = entries.iter().filter(|e| e.data.is_some()).collect();
    let packed: Vec<u8> = files
        .iter()
        .flat_map(|e| e.data.unwrap().iter().copied())
        .collect();

    let mut metadata = vec![K_HEADER];

    if !files.is_empty() {
        metadata.push(K_MAIN_STREAMS_INFO);

        metadata.push(K_PACK_INFO);
        write_number(&mut metadata, 0); // pack position
        write_number(&mut metadata, files.len() as u64);
        metadata.push(K_SIZE);
        for file in &files {
            write_number(&mut metadata, file.data.unwrap().len() as u64);
        }
        metadata.push(K_END);

        // One single-coder folder per file, the way 7-Zip stores Copy data.
        metadata.push(K_UNPACK_INFO);
        metadata.push(K_FOLDER);
        write_number(&mut metadata, files.len() as u64);
        metadata.push(0); // internal
        for _ in &files {
            write_number(&mut metadata, 1); // coders
            metadata.push(0x01); // simple coder, 1-byte codec ID
            metadata.push(codec_id);
        }
        metadata.push(K_CODERS_UNPACK_SIZE);
        for file in &files {
            write_number(&mut metadata, file.data.unwrap().len() as u64);
        }
        metadata.push(K_CRC);
        metadata.push(1); // all defined
        for file in &files {
            metadata.extend_from_slice(&crc32fast::hash(file.data.unwrap()).to_le_bytes());
        }
        metadata.push(K_END);

        metadata.push(K_END); // end of streams info
    }

    metadata.extend(sevenzip_files_info(entries));
    metadata.push(K_END);

    sevenzip_assemble(packed, metadata)
}

/// Build a 7z archive with one Copy folder per non-empty file.
pub fn sevenzip_archive(entries: &[SevenZipEntry]) -> Vec<u8> {
    sevenzip_archive_with_codec(entries, 0x00)
}

/// Same layout as [`sevenzip_archive`] but with an unsupported codec ID.
pub fn sevenzip_non_copy_archive(entries: &[SevenZipEntry]) -> Vec<u8> {
    sevenzip_archive_with_codec(entries, 0x21)
}

/// Build a 7z archive whose files share one Copy folder, described through
/// the substreams info.
pub fn sevenzip_solid_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let packed: Vec<u8> = files.iter().flat_map(|(_, d)| d.iter().copied()).collect();

    let mut metadata = vec![K_HEADER];

    metadata.push(K_MAIN_STREAMS_INFO);

    metadata.push(K_PACK_INFO);
    write_number(&mut metadata, 0);
    write_number(&mut metadata, 1);
    metadata.push(K_SIZE);
    write_number(&mut metadata, packed.len() as u64);
    metadata.push(K_END);

    metadata.push(K_UNPACK_INFO);
    metadata.push(K_FOLDER);
    write_number(&mut metadata, 1);
    metadata.push(0);
    write_number(&mut metadata, 1);
    metadata.push(0x01);
    metadata.push(0x00);
    metadata.push(K_CODERS_UNPACK_SIZE);
    write_number(&mut metadata, packed.len() as u64);
    metadata.push(K_END);

    metadata.push(K_SUB_STREAMS_INFO);
    metadata.push(K_NUM_UNPACK_STREAM);
    write_number(&mut metadata, files.len() as u64);
    metadata.push(K_SIZE);
    for (_, data) in &files[..files.len() - 1] {
        write_number(&mut metadata, data.len() as u64);
    }
    metadata.push(K_CRC);
    metadata.push(1); // all defined
    for (_, data) in files {
        metadata.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    }
    metadata.push(K_END);

    metadata.push(K_END);

    let entries: Vec<SevenZipEntry> = files
        .iter()
        .map(|(name, data)| SevenZipEntry::file(name, data))
        .collect();
    metadata.extend(sevenzip_files_info(&entries));
    metadata.push(K_END);

    sevenzip_assemble(packed, metadata)
}

/// A 7z archive whose metadata is itself compressed; readers without
/// decompression support must reject it.
pub fn sevenzip_encoded_header_archive() -> Vec<u8> {
    let mut metadata = vec![0x17];
    // A plausible streams info for the encoded header; never parsed.
    metadata.extend_from_slice(&[K_PACK_INFO, 0x00, 0x01, K_SIZE, 0x10, K_END, K_END]);

    sevenzip_assemble(vec![0xaa; 16], metadata)
}

// ---------------------------------------------------------------------------
// PAR2

fn par2_packet(set_id: [u8; 16], packet_type: &[u8; 16], body: &[u8]) -> Vec<u8> {
    let mut body = body.to_vec();
    while body.len() % 4 != 0 {
        body.push(0);
    }

    let length = (64 + body.len()) as u64;

    let mut hashed = set_id.to_vec();
    hashed.extend_from_slice(packet_type);
    hashed.extend_from_slice(&body);
    let packet_hash = md5::compute(&hashed).0;

    let mut packet = b"PAR2\0PKT".to_vec();
    packet.extend_from_slice(&length.to_le_bytes());
    packet.extend_from_slice(&packet_hash);
    packet.extend_from_slice(&set_id);
    packet.extend_from_slice(packet_type);
    packet.extend(body);
    packet
}

pub fn par2_file_description_packet(set_id: [u8; 16], name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = vec![];
    body.extend_from_slice(&md5::compute(name.as_bytes()).0); // file ID
    body.extend_from_slice(&md5::compute(data).0);
    body.extend_from_slice(&md5::compute(&data[..data.len().min(16384)]).0);
    body.extend_from_slice(&(data.len() as u64).to_le_bytes());
    body.extend_from_slice(name.as_bytes());

    par2_packet(set_id, b"PAR 2.0\0FileDesc", &body)
}

/// A PAR2 index: one file description per file plus a creator packet the
/// parser must skip.
pub fn par2_index(set_id: [u8; 16], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut index = vec![];

    for (name, data) in files {
        index.extend(par2_file_description_packet(set_id, name, data));
    }

    index.extend(par2_packet(set_id, b"PAR 2.0\0Creator\0", b"volmap tests"));
    index
}
