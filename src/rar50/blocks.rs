use std::{io, ops::Deref};

use crate::{read::*, size::BlockSize, time_conv};

use super::MAX_PATH_SIZE;

#[derive(Debug)]
/// A generic RAR50 block.
pub struct Block {
    /// Offset of this block from the start of the stream.
    pub offset: u64,

    /// Flags common to all block types.
    pub flags: CommonFlags,

    /// CRC32 hash of the header.
    pub header_crc32: u32,

    /// Size of the whole header, including the CRC and the size vint
    /// itself but not the data area.
    pub header_size: u64,

    /// Size of the extra area at the end of the header.
    pub extra_area_size: Option<u64>,

    /// Size of the data area following the header.
    pub data_size: Option<u64>,

    /// Specific type of this block.
    pub kind: BlockKind,
}

flags! {
    pub struct CommonFlags(u16) {
        /// Additional extra area is present at the end of the block header.
        pub has_extra_area = 0x0001;

        /// Additional data area is present at the end of the block header.
        pub has_data_area = 0x0002;

        /// Unknown blocks with this flag must be skipped when updating an archive.
        pub skip_if_unknown = 0x0004;
    }
}

#[derive(Debug)]
pub enum BlockKind {
    Main(MainBlock),
    File(FileBlock),
    /// Service blocks carry archive-internal streams (comments, quick open
    /// data); only their size matters here.
    Service,
    EndArchive(EndArchiveBlock),
    Unknown(UnknownBlock),
}

impl Block {
    const MAIN: u64 = 0x01;
    const FILE: u64 = 0x02;
    const SERVICE: u64 = 0x03;
    const ENDARC: u64 = 0x05;

    pub fn read<R: io::Read + io::Seek>(reader: &mut R) -> io::Result<Self> {
        let offset = reader.stream_position()?;

        let header_crc32 = read_u32(reader)?;

        let (header_size, vint_size) = read_vint(reader)?;
        let full_header_size = header_size + vint_size as u64 + 4;

        let (header_type, _) = read_vint(reader)?;

        let (flags, _) = read_vint(reader)?;
        let flags = CommonFlags::new(flags as u16);

        let extra_area_size = if flags.has_extra_area() {
            Some(read_vint(reader)?.0)
        } else {
            None
        };

        let data_size = if flags.has_data_area() {
            Some(read_vint(reader)?.0)
        } else {
            None
        };

        let kind = match header_type {
            Self::MAIN => BlockKind::Main(MainBlock::read(reader)?),
            Self::FILE => BlockKind::File(FileBlock::read(reader)?),
            Self::SERVICE => BlockKind::Service,
            Self::ENDARC => BlockKind::EndArchive(EndArchiveBlock::read(reader)?),
            _ => BlockKind::Unknown(UnknownBlock::read(reader, header_type)?),
        };

        Ok(Block {
            offset,
            flags,
            header_crc32,
            header_size: full_header_size,
            extra_area_size,
            data_size,
            kind,
        })
    }
}

impl Deref for Block {
    type Target = CommonFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

impl BlockSize for Block {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn header_size(&self) -> u64 {
        self.header_size
    }

    fn data_size(&self) -> u64 {
        self.data_size.unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct MainBlock {
    pub flags: MainBlockFlags,

    /// Volume number field, present in all volumes except the first.
    pub volume_number: Option<u64>,
}

flags! {
    pub struct MainBlockFlags(u16) {
        /// Archive is part of a multi-volume archive.
        pub is_volume = 0x0001;

        /// Volume number field is present. True for all volumes except first.
        has_volume_number = 0x0002;

        /// https://en.wikipedia.org/wiki/Solid_compression
        pub is_solid = 0x0004;

        /// Contains a recovery record.
        pub has_recovery_record = 0x0008;

        /// WinRAR will not modify this archive.
        pub is_locked = 0x0010;
    }
}

impl MainBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = MainBlockFlags::new(flags as u16);

        let volume_number = if flags.has_volume_number() {
            Some(read_vint(reader)?.0)
        } else {
            None
        };

        Ok(MainBlock {
            flags,
            volume_number,
        })
    }
}

impl Deref for MainBlock {
    type Target = MainBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

int_enum! {
    pub enum HostOs : u8 {
        Windows = 0,
        Unix = 1,
    }
}

/// Compression settings of a file or service block.
pub struct CompressionInfo(u64);

impl CompressionInfo {
    const METHOD_MASK: u64 = 0x7f;

    pub fn new(info: u64) -> Self {
        Self(info)
    }

    /// Compression method; 0 means the data is stored without compression.
    pub fn method(&self) -> u64 {
        self.0 & Self::METHOD_MASK
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for CompressionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionInfo")
            .field("method", &self.method())
            .finish()
    }
}

#[derive(Debug)]
pub struct FileBlock {
    pub flags: FileBlockFlags,

    /// Size of the file after decompression.
    pub unpacked_size: u64,

    /// OS-specific file attributes.
    pub attributes: u64,

    /// File modification time, or the raw unix timestamp when out of range.
    pub modification_time: Option<Result<time::OffsetDateTime, u32>>,

    /// CRC32 of the unpacked file.
    pub unpacked_data_crc32: Option<u32>,

    /// Compression settings for this file.
    pub compression_info: CompressionInfo,

    /// OS used to create the archive.
    pub host_os: HostOs,

    /// Name of the archived file. Forward slash is used as path separator
    /// for both Unix and Windows.
    pub name: String,
}

flags! {
    pub struct FileBlockFlags(u16) {
        pub is_directory = 0x0001;
        pub has_modification_time = 0x0002;
        pub has_crc32 = 0x0004;

        /// Data area continues from the previous volume.
        pub split_before = 0x0008;

        /// Data area continues in the next volume.
        pub split_after = 0x0010;
    }
}

impl FileBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = FileBlockFlags::new(flags as u16);

        let (unpacked_size, _) = read_vint(reader)?;
        let (attributes, _) = read_vint(reader)?;

        let modification_time = if flags.has_modification_time() {
            let seconds = read_u32(reader)?;
            Some(time_conv::parse_unix_timestamp_sec(seconds).map_err(|_| seconds))
        } else {
            None
        };

        let unpacked_data_crc32 = if flags.has_crc32() {
            Some(read_u32(reader)?)
        } else {
            None
        };

        let (compression_info, _) = read_vint(reader)?;
        let compression_info = CompressionInfo::new(compression_info);

        let (host_os, _) = read_vint(reader)?;
        let (name_length, _) = read_vint(reader)?;

        let mut name = read_vec(reader, name_length.clamp(0, MAX_PATH_SIZE) as usize)?;
        for byte in &mut name {
            if *byte == b'\\' {
                *byte = b'/';
            }
        }
        let name = String::from_utf8_lossy(&name).into_owned();

        Ok(FileBlock {
            flags,
            unpacked_size,
            attributes,
            modification_time,
            unpacked_data_crc32,
            compression_info,
            host_os: (host_os as u8).into(),
            name,
        })
    }
}

impl Deref for FileBlock {
    type Target = FileBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
pub struct EndArchiveBlock {
    pub flags: EndArchiveBlockFlags,
}

flags! {
    pub struct EndArchiveBlockFlags(u16) {
        pub has_next_volume = 0x0001;
    }
}

impl EndArchiveBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = EndArchiveBlockFlags::new(flags as u16);

        Ok(EndArchiveBlock { flags })
    }
}

impl Deref for EndArchiveBlock {
    type Target = EndArchiveBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
pub struct UnknownBlock {
    pub tag: u64,
}

impl UnknownBlock {
    fn read<R: io::Read + io::Seek>(_reader: &mut R, tag: u64) -> io::Result<Self> {
        Ok(UnknownBlock { tag })
    }
}
