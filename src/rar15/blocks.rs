use std::{io, ops::Deref};

use crate::{read::*, size::BlockSize, time_conv};

use super::NAME_MAX_SIZE;

#[derive(Debug)]
/// A generic RAR15 block.
pub struct Block {
    /// Offset of this block from the start of the stream.
    pub offset: u64,

    /// CRC16 hash of the header.
    pub header_crc16: u16,

    /// Size of the header, including the 7-byte frame.
    pub header_size: u16,

    /// Specific type of this block.
    pub kind: BlockKind,
}

flags! {
    /// Flags that are common to all blocks.
    pub struct CommonFlags(u16) {
        /// Unknown blocks with this flag must be skipped when updating
        /// an archive.
        pub skip_if_unknown = 0x4000;

        /// Data area is present in the end of block header.
        pub contains_data = 0x8000;
    }
}

impl Block {
    /// Size of the frame every block starts with:
    /// `crc16(2) | type(1) | flags(2) | size(2)`.
    pub const FRAME_SIZE: u64 = 7;

    const MAIN: u8 = 0x73;
    const FILE: u8 = 0x74;
    const ENDARC: u8 = 0x7b;

    pub fn read<R: io::Read + io::Seek>(reader: &mut R) -> io::Result<Self> {
        let offset = reader.stream_position()?;

        let header_crc16 = read_u16(reader)?;
        let block_type = read_u8(reader)?;
        let flags = read_u16(reader)?;
        let header_size = read_u16(reader)?;

        let kind = match block_type {
            Self::MAIN => BlockKind::Main(MainBlock::read(reader, flags)?),
            Self::FILE => BlockKind::File(FileBlock::read(reader, flags)?),
            Self::ENDARC => BlockKind::EndArchive(EndArchiveBlock::read(reader, flags)?),
            _ => BlockKind::Unknown(UnknownBlock::read(reader, flags, block_type)?),
        };

        Ok(Block {
            offset,
            header_crc16,
            header_size,
            kind,
        })
    }
}

impl BlockSize for Block {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn header_size(&self) -> u64 {
        self.header_size as u64
    }

    fn data_size(&self) -> u64 {
        match &self.kind {
            BlockKind::File(b) => b.packed_data_size,
            BlockKind::Unknown(b) => b.data_size.unwrap_or(0) as u64,
            BlockKind::Main(_) | BlockKind::EndArchive(_) => 0,
        }
    }
}

#[derive(Debug)]
/// Concrete block type.
pub enum BlockKind {
    Main(MainBlock),
    File(FileBlock),
    EndArchive(EndArchiveBlock),
    Unknown(UnknownBlock),
}

#[derive(Debug)]
/// Main block containing archive metadata.
///
/// This should be the first block in the archive and, in a multi-volume
/// set, the first block of every volume.
pub struct MainBlock {
    /// Flags containing archive metadata.
    pub flags: MainBlockFlags,

    /// Offset of the authenticity verification block in the archive.
    pub av_block_offset: Option<u64>,

    /// Version of the encryption used to encrypt the archive.
    pub encrypt_version: Option<u8>,
}

flags! {
    /// [`MainBlock`] flags.
    pub struct MainBlockFlags(u16) {
        /// Archive spans multiple volumes.
        pub is_volume = 0x0001;

        /// WinRAR will not modify this archive.
        pub is_locked = 0x0004;

        /// Archive uses solid compression.
        pub is_solid = 0x0008;

        /// In a multi-volume archive, indicates that the filenames end with
        /// `{.part01.rar, .part02.rar, ..., .partNN.rar}` rather than with
        /// `{.rar, .r00, .r01, ... .rNN}`
        pub uses_new_numbering = 0x0010;

        /// Archive is password-encrypted.
        pub has_password = 0x0080;

        /// Archive is the first volume in a multi-volume archive.
        /// Set only by RAR 3.0+
        pub is_first_volume = 0x0100;

        /// Indicates whether encryption is present in the archive.
        pub(self) has_encrypt_version = 0x0200;
    }
}

impl MainBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R, flags: u16) -> io::Result<Self> {
        let flags = MainBlockFlags::new(flags);

        let high_av_offset = read_u16(reader)? as u64;
        let low_av_offset = read_u32(reader)? as u64;
        let av_offset = low_av_offset | (high_av_offset << 32);
        let av_block_offset = if av_offset == 0 {
            None
        } else {
            Some(av_offset)
        };

        let encrypt_version = if flags.has_encrypt_version() {
            let encrypt_version = read_u8(reader)?;
            Some(encrypt_version)
        } else {
            None
        };

        Ok(MainBlock {
            flags,
            av_block_offset,
            encrypt_version,
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
    /// OS of the host system used to add the file to the archive.
    pub enum HostOs : u8 {
        /// MS-DOS
        MsDos = 0,

        /// OS/2
        Os2 = 1,

        /// Windows
        Win32 = 2,

        /// Unix-like (Linux, OS X/macOS)
        Unix = 3,

        /// Classic Mac OS (not to be confused with OS X/macOS)
        MacOs = 4,

        /// BeOS
        BeOs = 5,
    }
}

#[derive(Debug)]
/// Block containing a file or a directory.
pub struct FileBlock {
    /// File block flags.
    pub flags: FileBlockFlags,

    /// Size of the data section of the block.
    pub packed_data_size: u64,

    /// Size of the file after decompression.
    pub unpacked_data_size: u64,

    /// OS used to add this file the archive.
    pub host_os: HostOs,

    /// CRC32 hash of the file.
    pub file_crc32: u32,

    /// Modification time of the file, or the raw DOS datetime when out of
    /// range.
    pub modification_time: Result<time::PrimitiveDateTime, u32>,

    pub unpack_version: u8,

    /// Compression method byte; `0x30` means the data is stored as-is.
    pub method: u8,

    /// File attributes, dependent on the OS.
    pub attributes: u32,

    /// Filename of the file.
    pub file_name: String,
}

flags! {
    /// [`FileBlock`] flags.
    pub struct FileBlockFlags(u16) {
        /// Data area continues from the previous volume.
        pub split_before = 0x0001;

        /// Data area continues in the next volume.
        pub split_after = 0x0002;

        /// The file sizes are larger than u32::MAX.
        pub(self) has_large_size = 0x0100;
    }
}

impl FileBlock {
    /// The method byte of a file stored without compression.
    pub const METHOD_STORE: u8 = 0x30;

    const DIRECTORY_MASK: u16 = 0x00e0;

    fn read<R: io::Read + io::Seek>(reader: &mut R, flags: u16) -> io::Result<Self> {
        let flags = FileBlockFlags::new(flags);

        let low_packed_data_size = read_u32(reader)? as u64;
        let low_unpacked_data_size = read_u32(reader)? as u64;
        let host_os = read_u8(reader)?.into();
        let file_crc32 = read_u32(reader)?;
        let modification_time = read_u32(reader)?;
        let modification_time =
            time_conv::parse_dos_datetime(modification_time).map_err(|_| modification_time);
        let unpack_version = read_u8(reader)?;
        let method = read_u8(reader)?;
        let name_size = read_u16(reader)?.clamp(0, NAME_MAX_SIZE) as usize;
        let attributes = read_u32(reader)?;

        let (packed_data_size, unpacked_data_size) = if flags.has_large_size() {
            let high_packed_data_size = read_u32(reader)? as u64;
            let high_unpacked_data_size = read_u32(reader)? as u64;

            (
                (high_packed_data_size << 32) | low_packed_data_size,
                (high_unpacked_data_size << 32) | low_unpacked_data_size,
            )
        } else {
            (low_packed_data_size, low_unpacked_data_size)
        };

        let file_name = read_vec(reader, name_size)?;
        let file_name = String::from_utf8_lossy(&file_name).into_owned();

        Ok(FileBlock {
            flags,
            packed_data_size,
            unpacked_data_size,
            host_os,
            file_crc32,
            modification_time,
            unpack_version,
            method,
            attributes,
            file_name,
        })
    }

    /// Whether this block describes a directory.
    ///
    /// All three window bits must be set; any other combination selects the
    /// compression dictionary size.
    pub fn is_directory(&self) -> bool {
        self.flags.0 & Self::DIRECTORY_MASK == Self::DIRECTORY_MASK
    }
}

impl Deref for FileBlock {
    type Target = FileBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
/// Block signaling the end of the archive or of the current volume.
pub struct EndArchiveBlock {
    /// End archive block flags.
    pub flags: EndArchiveBlockFlags,

    /// CRC32 of the archive data up to this block.
    pub archive_data_crc32: Option<u32>,

    /// Number of the current volume.
    pub volume_number: Option<u16>,
}

flags! {
    /// [`EndArchiveBlock`] flags.
    pub struct EndArchiveBlockFlags(u16) {
        /// Archive continues in the next volume.
        pub has_next_volume = 0x0001;

        /// Store CRC32 of RAR archive (only used in volumes).
        pub(self) has_crc32 = 0x0002;

        /// Store the number of the current volume.
        pub(self) has_volume_number = 0x0008;
    }
}

impl EndArchiveBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R, flags: u16) -> io::Result<Self> {
        let flags = EndArchiveBlockFlags::new(flags);

        let archive_data_crc32 = if flags.has_crc32() {
            Some(read_u32(reader)?)
        } else {
            None
        };

        let volume_number = if flags.has_volume_number() {
            Some(read_u16(reader)?)
        } else {
            None
        };

        Ok(EndArchiveBlock {
            flags,
            archive_data_crc32,
            volume_number,
        })
    }
}

impl Deref for EndArchiveBlock {
    type Target = EndArchiveBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
/// Block that couldn't be decoded.
pub struct UnknownBlock {
    /// Tag identifying the block.
    pub tag: u8,

    /// Generic flags.
    pub flags: CommonFlags,

    /// Size of the data section.
    pub data_size: Option<u32>,
}

impl UnknownBlock {
    fn read<R: io::Read + io::Seek>(reader: &mut R, flags: u16, tag: u8) -> io::Result<Self> {
        let flags = CommonFlags::new(flags);

        let data_size = if flags.contains_data() {
            Some(read_u32(reader)?)
        } else {
            None
        };

        Ok(UnknownBlock {
            tag,
            flags,
            data_size,
        })
    }
}

impl Deref for UnknownBlock {
    type Target = CommonFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}
