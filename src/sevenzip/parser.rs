use std::io;

use log::debug;

use crate::{
    entry::SevenZipFileEntry,
    error::{Error, Result},
    read::*,
    signature::Signature,
};

use super::{
    header::{self, read_header, ATTRIBUTE_DIRECTORY},
    Method,
};

/// Size of the signature header at the start of every 7z archive.
const SIGNATURE_HEADER_SIZE: u64 = 32;

/// List the files of a 7z archive.
///
/// Reads the 32-byte signature header, jumps to the metadata block it
/// points at, and walks the property tree in memory. Requires a truly
/// random-access reader since the metadata lives at the end of the file.
pub fn list_files<R: io::Read + io::Seek>(reader: &mut R) -> Result<Vec<SevenZipFileEntry>> {
    reader.seek(io::SeekFrom::Start(0))?;
    let signature_header: [u8; SIGNATURE_HEADER_SIZE as usize] = read_const_bytes(reader)?;

    if &signature_header[..6] != Signature::SEVEN_ZIP {
        return Err(Error::InvalidSignature);
    }

    let start_header_crc = u32::from_le_bytes(signature_header[8..12].try_into().unwrap());
    if crc32fast::hash(&signature_header[12..32]) != start_header_crc {
        return Err(Error::CorruptHeader);
    }

    let next_header_offset = u64::from_le_bytes(signature_header[12..20].try_into().unwrap());
    let next_header_size = u64::from_le_bytes(signature_header[20..28].try_into().unwrap());
    let next_header_crc = u32::from_le_bytes(signature_header[28..32].try_into().unwrap());

    if next_header_size == 0 {
        return Ok(vec![]);
    }

    let metadata_position = SIGNATURE_HEADER_SIZE
        .checked_add(next_header_offset)
        .ok_or(Error::CorruptHeader)?;
    reader.seek(io::SeekFrom::Start(metadata_position))?;

    let metadata = read_vec(reader, next_header_size as usize)?;
    if crc32fast::hash(&metadata) != next_header_crc {
        return Err(Error::CorruptHeader);
    }

    debug!(
        "7z: metadata block of {} bytes at {}",
        next_header_size, metadata_position
    );

    let mut cursor = io::Cursor::new(metadata);
    match read_u8(&mut cursor)? {
        header::K_ENCODED_HEADER => Err(Error::Unsupported("compressed headers")),
        header::K_HEADER => assemble(read_header(&mut cursor)?),
        _ => Err(Error::CorruptHeader),
    }
}

/// Turn the parsed header into file entries, deriving each file's data
/// offset by walking the Copy-coded streams in `kFilesInfo` order.
fn assemble(header: header::Header) -> Result<Vec<SevenZipFileEntry>> {
    let Some(files) = header.files else {
        return Ok(vec![]);
    };

    let (pack_pos, sizes, crcs) = match header.streams {
        Some(streams) => match streams.substreams {
            Some(substreams) => (streams.pack_pos, substreams.sizes, substreams.crcs),
            None => (
                streams.pack_pos,
                streams.folders.iter().map(|f| f.unpack_size).collect(),
                streams.folder_crcs.clone(),
            ),
        },
        None => (0, vec![], vec![]),
    };

    let mut entries = Vec::with_capacity(files.names.len());
    let mut current_offset = SIGNATURE_HEADER_SIZE + pack_pos;
    let mut stream = 0;

    for (index, name) in files.names.into_iter().enumerate() {
        let empty_stream = files.empty_stream.get(index).copied().unwrap_or(false);
        let attributes = files.attributes.get(index).copied().flatten();

        if empty_stream {
            let attribute_directory =
                attributes.is_some_and(|attributes| attributes & ATTRIBUTE_DIRECTORY != 0);

            entries.push(SevenZipFileEntry {
                is_directory: attribute_directory || name.ends_with('/'),
                path: name,
                size: 0,
                packed_size: 0,
                data_offset: 0,
                method: None,
                crc32: None,
                attributes,
            });
            continue;
        }

        let size = *sizes.get(stream).ok_or(Error::CorruptHeader)?;
        let crc32 = crcs.get(stream).copied().flatten();
        stream += 1;

        let data_offset = if size == 0 {
            0
        } else {
            let offset = current_offset;
            current_offset += size;
            offset
        };

        entries.push(SevenZipFileEntry {
            path: name,
            size,
            // The Copy codec maps every byte through unchanged.
            packed_size: size,
            data_offset,
            is_directory: false,
            method: Some(Method::Copy),
            crc32,
            attributes,
        });
    }

    Ok(entries)
}
