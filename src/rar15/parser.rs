use std::{collections::HashMap, io};

use log::debug;

use crate::{
    entry::{HostOs, ModificationTime, RarFileEntry, SplitPart},
    error::{Error, Result},
    signature::Signature,
    size::BlockSize as _,
};

use super::{Block, BlockKind, FileBlock};

/// Size of the archive header block that follows the signature in every
/// volume: the 7-byte frame plus the fixed main block body.
const ARCHIVE_HEADER_SIZE: u64 = 13;

/// Bytes preceding the split file's data in every non-first volume of a
/// multi-volume set: signature, archive header and a copy of the file
/// header, whose size only depends on the name length and the large-file
/// flag.
pub fn continuation_header_size(name_length: usize, large_file: bool) -> u64 {
    Signature::Rar15.size()
        + ARCHIVE_HEADER_SIZE
        + Block::FRAME_SIZE
        + 25
        + name_length as u64
        + if large_file { 8 } else { 0 }
}

/// List the files of a RAR15 archive.
///
/// `reader` must hold the concatenation of all volumes in order and
/// `total_size` its full length. When `volume_sizes` is given, the
/// intermediate volumes of a stored multi-volume file are not read at all;
/// its split positions are computed from the sizes instead. The returned
/// entries are the same either way.
pub fn list_files<R: io::Read + io::Seek>(
    reader: &mut R,
    total_size: u64,
    volume_sizes: Option<&[u64]>,
) -> Result<Vec<RarFileEntry>> {
    Parser::new(reader, total_size, volume_sizes).run()
}

struct Parser<'a, R: io::Read + io::Seek> {
    reader: &'a mut R,
    total_size: u64,
    volume_starts: Option<Vec<u64>>,
    volume_sizes: Option<&'a [u64]>,
    position: u64,
    volume_index: u32,
    just_ended: bool,
    entries: Vec<RarFileEntry>,
    by_path: HashMap<String, usize>,
}

impl<'a, R: io::Read + io::Seek> Parser<'a, R> {
    fn new(reader: &'a mut R, total_size: u64, volume_sizes: Option<&'a [u64]>) -> Self {
        let volume_starts = volume_sizes.map(|sizes| {
            sizes
                .iter()
                .scan(0, |start, size| {
                    let current = *start;
                    *start += size;
                    Some(current)
                })
                .collect()
        });

        Self {
            reader,
            total_size,
            volume_starts,
            volume_sizes,
            position: 0,
            volume_index: 0,
            just_ended: false,
            entries: vec![],
            by_path: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Vec<RarFileEntry>> {
        self.reader.seek(io::SeekFrom::Start(0))?;
        let mut signature = [0; Signature::RAR15.len()];
        self.reader.read_exact(&mut signature)?;

        if &signature != Signature::RAR15 {
            return Err(Error::InvalidSignature);
        }

        self.position = Signature::Rar15.size();

        loop {
            if self.just_ended {
                if !self.scan_next_volume()? {
                    break;
                }
                continue;
            }

            if self.position >= self.total_size {
                break;
            }

            self.reader.seek(io::SeekFrom::Start(self.position))?;
            let block = Block::read(self.reader)?;

            if u64::from(block.header_size) < Block::FRAME_SIZE
                || block.offset() + block.size() > self.total_size
            {
                return Err(Error::CorruptHeader);
            }

            match block.kind {
                BlockKind::File(ref file) => self.on_file_block(&block, file)?,
                BlockKind::EndArchive(_) => {
                    self.just_ended = true;
                    self.position = block.offset + block.size();
                }
                BlockKind::Main(_) | BlockKind::Unknown(_) => {
                    self.position = block.offset + block.size();
                }
            }
        }

        Ok(self.entries)
    }

    /// Look for the signature of the next volume after an end-of-archive
    /// block, tolerating zero padding between volumes. Returns false when
    /// the stream is exhausted or the next bytes belong to something else.
    fn scan_next_volume(&mut self) -> Result<bool> {
        const SIGNATURE: &[u8] = Signature::RAR15;

        loop {
            if self.position + SIGNATURE.len() as u64 > self.total_size {
                return Ok(false);
            }

            self.reader.seek(io::SeekFrom::Start(self.position))?;
            let mut window = [0; SIGNATURE.len()];
            if self.reader.read_exact(&mut window).is_err() {
                return Ok(false);
            }

            if window[..] == *SIGNATURE {
                self.enter_volume();
                self.position += SIGNATURE.len() as u64;
                return Ok(true);
            }

            if window.iter().all(|&b| b == 0) {
                self.position += SIGNATURE.len() as u64;
                continue;
            }

            // The signature may start inside the window when the padding is
            // not a multiple of its size.
            let padding = window.iter().take_while(|&&b| b == 0).count();
            if padding > 0 && window[padding..] == SIGNATURE[..SIGNATURE.len() - padding] {
                let mut rest = vec![0; padding];
                if self.reader.read_exact(&mut rest).is_err() {
                    return Ok(false);
                }

                if rest[..] == SIGNATURE[SIGNATURE.len() - padding..] {
                    self.enter_volume();
                    self.position += (padding + SIGNATURE.len()) as u64;
                    return Ok(true);
                }
            }

            return Ok(false);
        }
    }

    fn enter_volume(&mut self) {
        self.volume_index += 1;
        self.just_ended = false;
        debug!(
            "rar15: volume {} continues at {}",
            self.volume_index, self.position
        );
    }

    fn on_file_block(&mut self, block: &Block, file: &FileBlock) -> Result<()> {
        let header_position = block.offset + Block::FRAME_SIZE;
        let data_position = block.offset + u64::from(block.header_size);
        let packed_size = file.packed_data_size;

        // Split files repeat their header in every volume they occupy; only
        // the first occurrence becomes an entry, the rest accumulate parts.
        if let Some(&index) = self.by_path.get(&file.file_name) {
            self.entries[index].split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_position,
                data_size: packed_size,
            });
            self.position = data_position + packed_size;
            return Ok(());
        }

        let compression_method = i32::from(file.method) - i32::from(FileBlock::METHOD_STORE);
        let is_split = file.split_before() || file.split_after();

        let mut entry = RarFileEntry {
            path: file.file_name.clone(),
            unpacked_size: file.unpacked_data_size,
            packed_size,
            header_position,
            data_position,
            is_directory: file.is_directory(),
            volume_index: self.volume_index,
            compression_method,
            split_parts: if is_split {
                vec![SplitPart {
                    volume_index: self.volume_index,
                    data_position,
                    data_size: packed_size,
                }]
            } else {
                vec![]
            },
            crc32: Some(file.file_crc32),
            host_os: HostOs::Rar15(file.host_os),
            attributes: file.attributes,
            modification_time: Some(ModificationTime::Dos(file.modification_time)),
        };

        if file.split_after() && compression_method == 0 && self.volume_sizes.is_some() {
            self.infer_split_parts(&mut entry, u64::from(block.header_size))?;
        } else {
            self.position = data_position + packed_size;
        }

        self.by_path
            .insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Compute the split parts of a stored file without reading the
    /// intermediate volumes, then resume parsing right after its last part.
    fn infer_split_parts(&mut self, entry: &mut RarFileEntry, file_header_size: u64) -> Result<()> {
        let sizes = self.volume_sizes.expect("only called with known sizes");
        let starts = self
            .volume_starts
            .as_ref()
            .expect("computed together with the sizes");

        let first_volume = self.volume_index as usize;
        if first_volume >= sizes.len() {
            return Err(Error::CorruptHeader);
        }

        // The continuation header repeats in every following volume, and the
        // trailing end-of-archive area is derived from this volume's layout
        // rather than assumed.
        let continuation_header =
            Signature::Rar15.size() + ARCHIVE_HEADER_SIZE + file_header_size;
        let end_of_archive = sizes[first_volume]
            .checked_sub(entry.data_position - starts[first_volume])
            .and_then(|s| s.checked_sub(entry.packed_size))
            .ok_or(Error::CorruptHeader)?;

        let mut remaining = entry
            .unpacked_size
            .checked_sub(entry.packed_size)
            .ok_or(Error::CorruptHeader)?;
        let mut end_of_last_part = entry.data_position + entry.packed_size;

        for volume in first_volume + 1..sizes.len() {
            if remaining == 0 {
                break;
            }

            let data_position = starts[volume] + continuation_header;
            let available = sizes[volume].saturating_sub(continuation_header + end_of_archive);
            let data_size = remaining.min(available);

            if data_size > 0 {
                entry.split_parts.push(SplitPart {
                    volume_index: volume as u32,
                    data_position,
                    data_size,
                });

                end_of_last_part = data_position + data_size;
                self.volume_index = volume as u32;
                remaining -= data_size;
            }
        }

        debug!(
            "rar15: inferred {} split parts for {:?}, resuming at {}",
            entry.split_parts.len(),
            entry.path,
            end_of_last_part
        );

        self.position = end_of_last_part;
        self.just_ended = false;
        Ok(())
    }
}
