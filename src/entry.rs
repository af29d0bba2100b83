use crate::{rar15, rar50, sevenzip::Method};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The portion of one archived file residing in one volume.
///
/// `data_position` is absolute in the concatenated stream.
pub struct SplitPart {
    pub volume_index: u32,
    pub data_position: u64,
    pub data_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// OS used to add a file to a RAR archive, in the vocabulary of the format
/// that recorded it.
pub enum HostOs {
    Rar15(rar15::HostOs),
    Rar50(rar50::HostOs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Modification time of a RAR file, kept in the representation its format
/// stores; the raw value survives when it is out of range.
pub enum ModificationTime {
    /// RAR15 DOS datetime.
    Dos(Result<time::PrimitiveDateTime, u32>),

    /// RAR50 unix timestamp.
    Unix(Result<time::OffsetDateTime, u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One file of a RAR archive, located down to the byte.
///
/// `header_position` points at the first header describing the file (right
/// after the 7-byte frame for RAR15, at the block start for RAR50), and
/// `data_position` right after that header's body, where the packed data
/// starts.
///
/// `split_parts` is empty for files contained in a single volume. When the
/// file spans volumes it holds one part per volume in order, the first of
/// which repeats `volume_index` and `data_position`.
pub struct RarFileEntry {
    pub path: String,
    pub unpacked_size: u64,

    /// Size of the packed data in the volume the file starts in.
    pub packed_size: u64,

    pub header_position: u64,
    pub data_position: u64,
    pub is_directory: bool,

    /// Volume the file starts in.
    pub volume_index: u32,

    /// 0 means the data is stored without compression.
    pub compression_method: i32,

    pub split_parts: Vec<SplitPart>,
    pub crc32: Option<u32>,

    /// OS used to add the file to the archive.
    pub host_os: HostOs,

    /// OS-specific file attributes.
    pub attributes: u32,

    /// Modification time, when the archive records one. RAR15 headers
    /// always carry it; RAR50 headers only by flag.
    pub modification_time: Option<ModificationTime>,
}

impl RarFileEntry {
    /// Whether the file's data is stored without compression.
    pub fn is_stored(&self) -> bool {
        self.compression_method == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One file of a 7z archive.
///
/// For Copy-coded files `packed_size` equals `size`; `data_offset` is 0 for
/// directories and empty streams.
pub struct SevenZipFileEntry {
    pub path: String,
    pub size: u64,
    pub packed_size: u64,
    pub data_offset: u64,
    pub is_directory: bool,
    pub method: Option<Method>,
    pub crc32: Option<u32>,

    /// Windows file attributes, when the archive records them.
    pub attributes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A file entry of whichever format the dispatcher detected.
pub enum FileEntry {
    Rar(RarFileEntry),
    SevenZip(SevenZipFileEntry),
}

impl FileEntry {
    /// Path of the file inside the archive.
    pub fn path(&self) -> &str {
        match self {
            Self::Rar(entry) => &entry.path,
            Self::SevenZip(entry) => &entry.path,
        }
    }

    /// Size of the file after unpacking.
    pub fn unpacked_size(&self) -> u64 {
        match self {
            Self::Rar(entry) => entry.unpacked_size,
            Self::SevenZip(entry) => entry.size,
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            Self::Rar(entry) => entry.is_directory,
            Self::SevenZip(entry) => entry.is_directory,
        }
    }
}
