use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One file of a multi-part archive set, as seen by the dispatcher.
///
/// The descriptor carries everything needed to pick a parser without
/// touching the stream: the filename, the size the volume contributes to
/// the concatenated stream, and optionally the first 16KiB of its content
/// for magic-byte detection and PAR2 name recovery.
pub struct VolumeDescriptor {
    pub name: String,
    pub size: u64,
    pub first_16kb: Option<Vec<u8>>,
}

impl VolumeDescriptor {
    pub fn new(name: impl Into<String>, size: u64, first_16kb: Option<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            size,
            first_16kb,
        }
    }
}

/// A seekable stream over the concatenation of ordered volumes.
///
/// Presents one absolute byte space in `[0, total_size]`; reads never cross
/// a volume boundary in a single call, and seeking past the end is allowed
/// like it is for files.
#[derive(Debug)]
pub struct Concat<R> {
    volumes: Vec<ConcatVolume<R>>,
    position: u64,
    total_size: u64,
}

#[derive(Debug)]
struct ConcatVolume<R> {
    reader: R,
    start: u64,
    size: u64,
}

impl<R: io::Read + io::Seek> Concat<R> {
    /// Build a concatenated stream, measuring each volume by seeking to its
    /// end. The readers must be given in volume order.
    pub fn new(readers: Vec<R>) -> io::Result<Self> {
        let mut volumes = Vec::with_capacity(readers.len());
        let mut total_size = 0;

        for mut reader in readers {
            let size = reader.seek(io::SeekFrom::End(0))?;

            volumes.push(ConcatVolume {
                reader,
                start: total_size,
                size,
            });
            total_size += size;
        }

        Ok(Self {
            volumes,
            position: 0,
            total_size,
        })
    }

    /// Total size of the concatenated stream.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Size of each volume, in order.
    pub fn volume_sizes(&self) -> Vec<u64> {
        self.volumes.iter().map(|v| v.size).collect()
    }

    fn volume_at(&mut self, position: u64) -> Option<&mut ConcatVolume<R>> {
        self.volumes
            .iter_mut()
            .find(|v| position >= v.start && position < v.start + v.size)
    }
}

impl<R: io::Read + io::Seek> io::Read for Concat<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.total_size || buf.is_empty() {
            return Ok(0);
        }

        let position = self.position;
        let Some(volume) = self.volume_at(position) else {
            return Ok(0);
        };

        let local = position - volume.start;
        let available = (volume.size - local).min(buf.len() as u64) as usize;

        volume.reader.seek(io::SeekFrom::Start(local))?;
        let read = volume.reader.read(&mut buf[..available])?;

        self.position += read as u64;
        Ok(read)
    }
}

impl<R: io::Read + io::Seek> io::Seek for Concat<R> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let position = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::End(offset) => self.total_size.checked_add_signed(offset),
            io::SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        match position {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Sort key for the recognized multi-volume naming conventions.
///
/// Returns `None` when the filename does not look like a volume. Keys are
/// only comparable within one archive set:
///
/// - `name.partN.rar` sorts by `N`
/// - `name.rar` comes first, then `name.r00 .. r99`, `name.s00 .. t99`
///   as `(letter - 'r') * 1000 + number`
/// - `name.7z` comes first, then `name.7z.001 .. NNN` sorts by `NNN`
pub fn volume_sort_key(file_name: &str) -> Option<u64> {
    let lower = file_name.to_lowercase();

    if let Some(rest) = lower.strip_suffix(".rar") {
        let Some((_, part)) = rest.rsplit_once('.') else {
            // Plain .rar, the first volume of the old-style convention.
            return Some(0);
        };

        return match part.strip_prefix("part") {
            Some(number) if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) => {
                number.parse().ok()
            }
            _ => Some(0),
        };
    }

    if lower.ends_with(".7z") {
        return Some(0);
    }

    let (stem, ext) = lower.rsplit_once('.')?;

    // name.7z.001
    if stem.ends_with(".7z") && ext.len() == 3 && ext.bytes().all(|b| b.is_ascii_digit()) {
        return ext.parse().ok();
    }

    // name.r00 .. name.t99
    let ext = ext.as_bytes();
    if ext.len() != 3
        || !(b'r'..=b't').contains(&ext[0])
        || !ext[1].is_ascii_digit()
        || !ext[2].is_ascii_digit()
    {
        return None;
    }
    let number = u64::from(ext[1] - b'0') * 10 + u64::from(ext[2] - b'0');

    Some(1 + u64::from(ext[0] - b'r') * 1000 + number)
}
