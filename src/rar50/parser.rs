use std::{collections::HashMap, io};

use log::debug;

use crate::{
    entry::{HostOs, ModificationTime, RarFileEntry, SplitPart},
    error::{Error, Result},
    signature::Signature,
    size::BlockSize as _,
};

use super::{Block, BlockKind, FileBlock};

/// List the files of a RAR50 archive.
///
/// Same contract as [`crate::rar15::list_files`]: `reader` holds the
/// concatenation of all volumes, and passing `volume_sizes` lets the parser
/// infer the split positions of stored multi-volume files without reading
/// the intermediate volumes.
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
    /// Full size of the most recently read main header block, reused when
    /// inferring the preamble of continuation volumes.
    main_block_size: Option<u64>,
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
            main_block_size: None,
            entries: vec![],
            by_path: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Vec<RarFileEntry>> {
        self.reader.seek(io::SeekFrom::Start(0))?;
        let mut signature = [0; Signature::RAR50.len()];
        self.reader.read_exact(&mut signature)?;

        if &signature != Signature::RAR50 {
            return Err(Error::InvalidSignature);
        }

        self.position = Signature::Rar50.size();

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

            // 4 bytes of CRC, the size vint and at least a type vint.
            if block.header_size < 6 || block.offset() + block.size() > self.total_size {
                return Err(Error::CorruptHeader);
            }

            match block.kind {
                BlockKind::File(ref file) => self.on_file_block(&block, file)?,
                BlockKind::Main(_) => {
                    self.main_block_size = Some(block.header_size);
                    self.position = block.offset + block.size();
                }
                BlockKind::EndArchive(_) => {
                    self.just_ended = true;
                    self.position = block.offset + block.size();
                }
                BlockKind::Service | BlockKind::Unknown(_) => {
                    self.position = block.offset + block.size();
                }
            }
        }

        Ok(self.entries)
    }

    /// Same continuation policy as RAR15, with the 8-byte RAR50 signature.
    fn scan_next_volume(&mut self) -> Result<bool> {
        const SIGNATURE: &[u8] = Signature::RAR50;

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
            "rar50: volume {} continues at {}",
            self.volume_index, self.position
        );
    }

    fn on_file_block(&mut self, block: &Block, file: &FileBlock) -> Result<()> {
        let data_position = block.offset + block.header_size;
        let data_size = block.data_size.unwrap_or(0);

        if let Some(&index) = self.by_path.get(&file.name) {
            self.entries[index].split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_position,
                data_size,
            });
            self.position = data_position + data_size;
            return Ok(());
        }

        let compression_method = file.compression_info.method() as i32;

        // Stored files are also split whenever this volume holds less data
        // than the file's total size, whatever the flags say.
        let is_split = file.split_before()
            || file.split_after()
            || (compression_method == 0 && data_size < file.unpacked_size);

        let mut entry = RarFileEntry {
            path: file.name.clone(),
            unpacked_size: file.unpacked_size,
            packed_size: data_size,
            header_position: block.offset,
            data_position,
            is_directory: file.is_directory(),
            volume_index: self.volume_index,
            compression_method,
            split_parts: if is_split {
                vec![SplitPart {
                    volume_index: self.volume_index,
                    data_position,
                    data_size,
                }]
            } else {
                vec![]
            },
            crc32: file.unpacked_data_crc32,
            host_os: HostOs::Rar50(file.host_os),
            attributes: file.attributes as u32,
            modification_time: file.modification_time.map(ModificationTime::Unix),
        };

        if file.split_after() && compression_method == 0 && self.volume_sizes.is_some() {
            self.infer_split_parts(&mut entry, block.header_size)?;
        } else {
            self.position = data_position + data_size;
        }

        self.by_path
            .insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Same derivation as RAR15: the continuation preamble is the signature
    /// plus the main header and file header blocks, and the trailing
    /// end-of-archive area comes from this volume's observed layout.
    fn infer_split_parts(&mut self, entry: &mut RarFileEntry, file_block_size: u64) -> Result<()> {
        let sizes = self.volume_sizes.expect("only called with known sizes");
        let starts = self
            .volume_starts
            .as_ref()
            .expect("computed together with the sizes");

        let first_volume = self.volume_index as usize;
        if first_volume >= sizes.len() {
            return Err(Error::CorruptHeader);
        }

        let main_block_size = self.main_block_size.ok_or(Error::CorruptHeader)?;
        let continuation_header = Signature::Rar50.size() + main_block_size + file_block_size;

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
            "rar50: inferred {} split parts for {:?}, resuming at {}",
            entry.split_parts.len(),
            entry.path,
            end_of_last_part
        );

        self.position = end_of_last_part;
        self.just_ended = false;
        Ok(())
    }
}
