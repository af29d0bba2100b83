//! Format detection and dispatch over an ordered set of volumes.

use std::{io, sync::LazyLock};

use log::debug;
use regex::Regex;

use crate::{
    entry::FileEntry,
    error::{Error, Result},
    par2::{self, Par2Info},
    rar15, rar50, sevenzip,
    signature::Signature,
    volume::VolumeDescriptor,
};

/// Filename extensions of recognized archive volumes.
///
/// Note that `.7z.001` is known but a bare `.001` is not; an obfuscated
/// `.001` volume needs PAR2 data to resolve.
static KNOWN_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(part\d+\.rar|rar|r\d{2}|s\d{2}|7z|7z\.\d{3})$").unwrap());

static SEVEN_ZIP_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(7z|7z\.\d{3})$").unwrap());

/// Whether the filename carries one of the recognized archive extensions.
pub fn file_has_known_extension(name: &str) -> bool {
    KNOWN_EXTENSION.is_match(name)
}

/// Give descriptors whose first 16KiB hash to a PAR2 file description their
/// original filename back. Descriptors without a match are left unchanged.
pub fn resolve_names(volumes: &mut [VolumeDescriptor], par2: &Par2Info) {
    for volume in volumes.iter_mut() {
        let Some(first_16kb) = &volume.first_16kb else {
            continue;
        };

        let digest = md5::compute(first_16kb).0;
        if let Some(description) = par2.find_by_hash_16k(&digest) {
            if volume.name != description.file_name {
                debug!(
                    "par2: renaming {:?} to {:?}",
                    volume.name, description.file_name
                );
                volume.name = description.file_name.clone();
            }
        }
    }
}

/// List the files of the archive spread over `volumes`.
///
/// `reader` must hold the concatenation of the volumes in descriptor order,
/// positioned anywhere. When `par2_bytes` is given and some volume lacks a
/// known archive extension, the PAR2 index is used to recover the original
/// filenames before detection.
pub fn list_files<R: io::Read + io::Seek>(
    reader: &mut R,
    volumes: &[VolumeDescriptor],
    par2_bytes: Option<&[u8]>,
) -> Result<Vec<FileEntry>> {
    let mut volumes = volumes.to_vec();

    if let Some(bytes) = par2_bytes {
        if volumes.iter().any(|v| !file_has_known_extension(&v.name)) {
            let info = par2::parse(bytes)?;
            resolve_names(&mut volumes, &info);
        }
    }

    let format = detect_format(reader, &volumes)?;
    debug!("dispatch: {:?} over {} volumes", format, volumes.len());

    let total_size = volumes.iter().map(|v| v.size).sum();
    let volume_sizes: Vec<u64> = volumes.iter().map(|v| v.size).collect();

    match format {
        Signature::Rar15 => Ok(rar15::list_files(reader, total_size, Some(&volume_sizes))?
            .into_iter()
            .map(FileEntry::Rar)
            .collect()),
        Signature::Rar50 => Ok(rar50::list_files(reader, total_size, Some(&volume_sizes))?
            .into_iter()
            .map(FileEntry::Rar)
            .collect()),
        Signature::SevenZip => Ok(sevenzip::list_files(reader)?
            .into_iter()
            .map(FileEntry::SevenZip)
            .collect()),
    }
}

/// Detect the format from the first volume: by filename extension where it
/// is conclusive, then by the magic bytes of `first_16kb`, finally by
/// reading the start of the stream.
fn detect_format<R: io::Read + io::Seek>(
    reader: &mut R,
    volumes: &[VolumeDescriptor],
) -> Result<Signature> {
    let first = volumes.first().ok_or(Error::UnknownFormat)?;

    // A RAR extension still needs the magic to tell RAR15 and RAR50 apart,
    // but a 7z one settles the format outright.
    if SEVEN_ZIP_EXTENSION.is_match(&first.name) {
        return Ok(Signature::SevenZip);
    }

    if let Some(first_16kb) = &first.first_16kb {
        if let Some(signature) = Signature::from_bytes(first_16kb) {
            return Ok(signature);
        }
    }

    reader.seek(io::SeekFrom::Start(0))?;
    let mut buffer = [0; 32];
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    Signature::from_bytes(&buffer[..filled]).ok_or(Error::UnknownFormat)
}
