use std::io;

use crate::{
    error::{Error, Result},
    read::*,
};

use super::number::read_number;

// Property tags of the header tree.
pub(super) const K_END: u8 = 0x00;
pub(super) const K_HEADER: u8 = 0x01;
pub(super) const K_MAIN_STREAMS_INFO: u8 = 0x04;
pub(super) const K_FILES_INFO: u8 = 0x05;
pub(super) const K_PACK_INFO: u8 = 0x06;
pub(super) const K_UNPACK_INFO: u8 = 0x07;
pub(super) const K_SUB_STREAMS_INFO: u8 = 0x08;
pub(super) const K_SIZE: u8 = 0x09;
pub(super) const K_CRC: u8 = 0x0a;
pub(super) const K_FOLDER: u8 = 0x0b;
pub(super) const K_CODERS_UNPACK_SIZE: u8 = 0x0c;
pub(super) const K_NUM_UNPACK_STREAM: u8 = 0x0d;
pub(super) const K_EMPTY_STREAM: u8 = 0x0e;
pub(super) const K_NAME: u8 = 0x11;
pub(super) const K_WIN_ATTRIBUTES: u8 = 0x15;
pub(super) const K_ENCODED_HEADER: u8 = 0x17;

/// Codec ID of the Copy (identity) codec.
const CODEC_COPY: &[u8] = &[0x00];

/// Windows directory attribute bit.
pub(super) const ATTRIBUTE_DIRECTORY: u32 = 0x10;

#[derive(Debug, Default)]
pub(super) struct Header {
    pub streams: Option<StreamsInfo>,
    pub files: Option<FilesInfo>,
}

#[derive(Debug, Default)]
pub(super) struct StreamsInfo {
    /// Offset of the packed streams, relative to the end of the signature
    /// header.
    pub pack_pos: u64,
    pub pack_sizes: Vec<u64>,
    pub folders: Vec<Folder>,
    pub folder_crcs: Vec<Option<u32>>,
    pub substreams: Option<SubStreamsInfo>,
}

#[derive(Debug)]
/// A single-coder Copy folder; its only property is the unpacked size.
pub(super) struct Folder {
    pub unpack_size: u64,
}

#[derive(Debug, Default)]
pub(super) struct SubStreamsInfo {
    /// Unpacked size of each substream, in folder order.
    pub sizes: Vec<u64>,
    /// CRC32 of each substream, where known.
    pub crcs: Vec<Option<u32>>,
}

#[derive(Debug, Default)]
pub(super) struct FilesInfo {
    pub names: Vec<String>,
    pub empty_stream: Vec<bool>,
    pub attributes: Vec<Option<u32>>,
}

/// Read the top-level header tree, positioned right after the `kHeader` tag.
pub(super) fn read_header<R: io::Read + io::Seek>(reader: &mut R) -> Result<Header> {
    let mut header = Header::default();

    loop {
        match read_u8(reader)? {
            K_END => return Ok(header),
            K_MAIN_STREAMS_INFO => header.streams = Some(read_streams_info(reader)?),
            K_FILES_INFO => header.files = Some(read_files_info(reader)?),
            _ => return Err(Error::CorruptHeader),
        }
    }
}

fn read_streams_info<R: io::Read + io::Seek>(reader: &mut R) -> Result<StreamsInfo> {
    let mut info = StreamsInfo::default();

    loop {
        match read_u8(reader)? {
            K_END => return Ok(info),
            K_PACK_INFO => read_pack_info(reader, &mut info)?,
            K_UNPACK_INFO => read_unpack_info(reader, &mut info)?,
            K_SUB_STREAMS_INFO => {
                info.substreams = Some(read_sub_streams_info(
                    reader,
                    &info.folders,
                    &info.folder_crcs,
                )?)
            }
            _ => return Err(Error::CorruptHeader),
        }
    }
}

fn read_pack_info<R: io::Read + io::Seek>(reader: &mut R, info: &mut StreamsInfo) -> Result<()> {
    info.pack_pos = read_number(reader)?;
    let count = read_number(reader)? as usize;

    loop {
        match read_u8(reader)? {
            K_END => return Ok(()),
            K_SIZE => {
                info.pack_sizes = (0..count)
                    .map(|_| read_number(reader))
                    .collect::<io::Result<_>>()?;
            }
            // CRCs of the packed streams; nothing here consumes them.
            K_CRC => {
                read_crcs(reader, count)?;
            }
            _ => return Err(Error::CorruptHeader),
        }
    }
}

fn read_unpack_info<R: io::Read + io::Seek>(reader: &mut R, info: &mut StreamsInfo) -> Result<()> {
    if read_u8(reader)? != K_FOLDER {
        return Err(Error::CorruptHeader);
    }

    let count = read_number(reader)? as usize;
    if read_u8(reader)? != 0 {
        return Err(Error::Unsupported("external folder data"));
    }

    for _ in 0..count {
        read_folder_coders(reader)?;
    }

    if read_u8(reader)? != K_CODERS_UNPACK_SIZE {
        return Err(Error::CorruptHeader);
    }

    // One output stream per folder with a single simple coder.
    info.folders = (0..count)
        .map(|_| Ok(Folder { unpack_size: read_number(reader)? }))
        .collect::<io::Result<_>>()?;
    info.folder_crcs = vec![None; count];

    loop {
        match read_u8(reader)? {
            K_END => return Ok(()),
            K_CRC => info.folder_crcs = read_crcs(reader, count)?,
            _ => return Err(Error::CorruptHeader),
        }
    }
}

/// Validate the coder list of one folder. Anything beyond a single plain
/// Copy coder cannot be located without decoding and is rejected.
fn read_folder_coders<R: io::Read + io::Seek>(reader: &mut R) -> Result<()> {
    let num_coders = read_number(reader)?;
    if num_coders != 1 {
        return Err(Error::Unsupported("multiple coders per folder"));
    }

    let flags = read_u8(reader)?;
    let id_size = (flags & 0x0f) as usize;
    if flags & 0x10 != 0 {
        return Err(Error::Unsupported("complex coders"));
    }

    let codec_id = read_vec(reader, id_size)?;
    if codec_id != CODEC_COPY {
        return Err(Error::Unsupported("non-Copy codec"));
    }

    if flags & 0x20 != 0 {
        let size = read_number(reader)? as usize;
        let _ = read_vec(reader, size)?;
        if size != 0 {
            return Err(Error::Unsupported("coder attributes"));
        }
    }

    Ok(())
}

fn read_sub_streams_info<R: io::Read + io::Seek>(
    reader: &mut R,
    folders: &[Folder],
    folder_crcs: &[Option<u32>],
) -> Result<SubStreamsInfo> {
    let mut counts: Option<Vec<u64>> = None;
    let mut sizes: Option<Vec<u64>> = None;
    let mut crcs: Option<Vec<Option<u32>>> = None;

    loop {
        match read_u8(reader)? {
            K_NUM_UNPACK_STREAM => {
                counts = Some(
                    (0..folders.len())
                        .map(|_| read_number(reader))
                        .collect::<io::Result<_>>()?,
                );
            }
            K_SIZE => {
                // All but the last size of each folder are explicit; the
                // last is whatever remains of the folder.
                let counts = counts.as_deref().unwrap_or(&[]);
                let mut all = vec![];

                for (index, folder) in folders.iter().enumerate() {
                    let count = counts.get(index).copied().unwrap_or(1);
                    let mut used = 0u64;

                    for _ in 1..count {
                        let size = read_number(reader)?;
                        used += size;
                        all.push(size);
                    }

                    if count > 0 {
                        all.push(
                            folder
                                .unpack_size
                                .checked_sub(used)
                                .ok_or(Error::CorruptHeader)?,
                        );
                    }
                }

                sizes = Some(all);
            }
            K_CRC => {
                // Only substreams without an inherited folder CRC are listed.
                let counts = counts.as_deref().unwrap_or(&[]);
                let inherited: Vec<Option<u32>> = folders
                    .iter()
                    .enumerate()
                    .flat_map(|(index, _)| {
                        let count = counts.get(index).copied().unwrap_or(1) as usize;
                        if count == 1 {
                            vec![folder_crcs.get(index).copied().flatten()]
                        } else {
                            vec![None; count]
                        }
                    })
                    .collect();

                let missing = inherited.iter().filter(|crc| crc.is_none()).count();
                let mut fresh = read_crcs(reader, missing)?.into_iter();

                crcs = Some(
                    inherited
                        .into_iter()
                        .map(|crc| crc.or_else(|| fresh.next().flatten()))
                        .collect(),
                );
            }
            K_END => break,
            _ => return Err(Error::CorruptHeader),
        }
    }

    let sizes = match sizes {
        Some(sizes) => sizes,
        // Without an explicit size list every folder must hold one stream.
        None => {
            if let Some(counts) = &counts {
                if counts.iter().any(|&n| n != 1) {
                    return Err(Error::CorruptHeader);
                }
            }
            folders.iter().map(|f| f.unpack_size).collect()
        }
    };

    let crcs = crcs.unwrap_or_else(|| {
        folders
            .iter()
            .enumerate()
            .flat_map(|(index, _)| {
                let count = counts
                    .as_ref()
                    .and_then(|c| c.get(index))
                    .copied()
                    .unwrap_or(1) as usize;
                if count == 1 {
                    vec![folder_crcs.get(index).copied().flatten()]
                } else {
                    vec![None; count]
                }
            })
            .collect()
    });

    Ok(SubStreamsInfo { sizes, crcs })
}

fn read_files_info<R: io::Read + io::Seek>(reader: &mut R) -> Result<FilesInfo> {
    let count = read_number(reader)? as usize;

    let mut info = FilesInfo {
        names: vec![],
        empty_stream: vec![false; count],
        attributes: vec![None; count],
    };

    loop {
        let property = read_u8(reader)?;
        if property == K_END {
            break;
        }

        let size = read_number(reader)?;
        let start = reader.stream_position()?;

        match property {
            K_EMPTY_STREAM => info.empty_stream = read_bits(reader, count)?,
            K_NAME => info.names = read_names(reader, size, count)?,
            K_WIN_ATTRIBUTES => {
                let defined = read_all_or_bits(reader, count)?;
                let _external = read_u8(reader)?;

                for (index, defined) in defined.into_iter().enumerate() {
                    if defined {
                        info.attributes[index] = Some(read_u32(reader)?);
                    }
                }
            }
            // kEmptyFile, kMTime, kDummy and anything newer are skipped;
            // the size prefix below is the only anchor we rely on.
            _ => {}
        }

        reader.seek(io::SeekFrom::Start(start + size))?;
    }

    Ok(info)
}

/// UTF-16LE filenames, each terminated by a null unit.
fn read_names<R: io::Read + io::Seek>(
    reader: &mut R,
    property_size: u64,
    count: usize,
) -> Result<Vec<String>> {
    if read_u8(reader)? != 0 {
        return Err(Error::Unsupported("external file names"));
    }

    let bytes = property_size.checked_sub(1).ok_or(Error::CorruptHeader)?;
    let bytes = read_vec(reader, bytes as usize)?;

    let mut names = Vec::with_capacity(count);
    let mut units = vec![];

    for pair in bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);

        if unit == 0 {
            names.push(String::from_utf16_lossy(&units));
            units.clear();
        } else {
            units.push(unit);
        }
    }

    if !units.is_empty() || names.len() != count {
        return Err(Error::CorruptHeader);
    }

    Ok(names)
}

/// A bit vector, most significant bit of each byte first.
fn read_bits<R: io::Read>(reader: &mut R, count: usize) -> Result<Vec<bool>> {
    let mut bits = Vec::with_capacity(count);
    let mut byte = 0;
    let mut mask = 0;

    for _ in 0..count {
        if mask == 0 {
            byte = read_u8(reader)?;
            mask = 0x80;
        }

        bits.push(byte & mask != 0);
        mask >>= 1;
    }

    Ok(bits)
}

/// A bit vector that may be collapsed into a single "all defined" byte.
fn read_all_or_bits<R: io::Read>(reader: &mut R, count: usize) -> Result<Vec<bool>> {
    if read_u8(reader)? != 0 {
        Ok(vec![true; count])
    } else {
        read_bits(reader, count)
    }
}

/// A defined-bitmap followed by one CRC32 per defined entry.
fn read_crcs<R: io::Read>(reader: &mut R, count: usize) -> Result<Vec<Option<u32>>> {
    let defined = read_all_or_bits(reader, count)?;

    defined
        .into_iter()
        .map(|defined| {
            if defined {
                Ok(Some(read_u32(reader)?))
            } else {
                Ok(None)
            }
        })
        .collect()
}
