use std::io;

use aho_corasick::AhoCorasick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// File signatures or "magic numbers" of the supported archive formats.
pub enum Signature {
    /// RAR archive written by RAR 1.5 to 4.x.
    Rar15,

    /// RAR archive written by RAR 5+.
    Rar50,

    /// 7z archive.
    SevenZip,
}

impl Signature {
    /// File signature of RAR15.
    pub const RAR15: &[u8; 7] = b"Rar!\x1a\x07\x00";
    /// File signature of RAR50.
    pub const RAR50: &[u8; 8] = b"Rar!\x1a\x07\x01\x00";
    /// File signature of 7z.
    pub const SEVEN_ZIP: &[u8; 6] = b"7z\xbc\xaf\x27\x1c";

    /// Byte size of the signature.
    pub const fn size(&self) -> u64 {
        self.signature().len() as u64
    }

    /// The byte signature corresponding to the format.
    pub const fn signature(&self) -> &'static [u8] {
        match self {
            Self::Rar15 => Self::RAR15,
            Self::Rar50 => Self::RAR50,
            Self::SevenZip => Self::SEVEN_ZIP,
        }
    }

    /// Parse the archive signature from the start of a byte slice.
    ///
    /// RAR50 is tested before RAR15 because its signature extends RAR15's
    /// by one byte.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(Self::RAR50) {
            Some(Self::Rar50)
        } else if bytes.starts_with(Self::RAR15) {
            Some(Self::Rar15)
        } else if bytes.starts_with(Self::SEVEN_ZIP) {
            Some(Self::SevenZip)
        } else {
            None
        }
    }

    /// Classify the first bytes of a volume and decide whether it is the
    /// first volume of its set.
    ///
    /// For RAR15 the block following the signature tells the two cases
    /// apart: an archive header carries a "first volume" flag, and a file
    /// header starting with "split before" set can only belong to a
    /// continuation volume. RAR50 and 7z volumes are always reported as
    /// first; their parsers detect continuations themselves.
    pub fn detect(bytes: &[u8]) -> Option<(Self, bool)> {
        let format = Self::from_bytes(bytes)?;

        if format != Self::Rar15 {
            return Some((format, true));
        }

        // crc16(2) | type(1) | flags(2 LE) | size(2 LE), right after the signature
        let Some(block) = bytes.get(7..14) else {
            return Some((format, true));
        };
        let block_type = block[2];
        let flags = u16::from_le_bytes([block[3], block[4]]);

        let is_first_volume = match block_type {
            0x73 => flags & 0x0100 != 0,
            0x74 => flags & 0x0001 == 0,
            _ => true,
        };

        Some((format, is_first_volume))
    }

    /// The maximum size of the SFX binary embedded before the archive
    /// signature, including the signature size.
    ///
    /// If the end of the signature exceeds this offset then this is not a
    /// valid archive.
    pub const MAX_SFX_SIZE: u64 = 0x200000;

    /// Search for an archive signature in the stream up to
    /// [`Signature::MAX_SFX_SIZE`] and return the format and the offset of
    /// the signature in the file.
    ///
    /// The signature generally starts at offset 0, but archives can also be
    /// constructed as a [*SFX*](https://en.wikipedia.org/wiki/Self-extracting_archive)
    /// (self-extracting archive) which embed the binary needed to extract
    /// the archive before the archive itself.
    ///
    /// Uses [`aho_corasick`](https://docs.rs/aho-corasick/latest/aho_corasick/)
    /// under the hood to search for the signatures efficiently.
    pub fn search_stream<R: io::Read>(reader: R) -> Result<Option<(Self, u64)>, io::Error> {
        let patterns = [&Self::RAR50[..], &Self::RAR15[..], &Self::SEVEN_ZIP[..]];

        let Ok(ac) = AhoCorasick::new(patterns) else {
            unreachable!("Aho-Corasick pattern not constructed correctly")
        };

        // Avoid reading the whole file in case we don't find the signature
        // within MAX_SFX_SIZE.
        let bounded_reader = &mut reader.take(Self::MAX_SFX_SIZE);

        match ac.stream_find_iter(bounded_reader).next() {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok(m)) => {
                let start = m.start();

                let format = match m.pattern().as_i32() {
                    0 => Self::Rar50,
                    1 => Self::Rar15,
                    2 => Self::SevenZip,
                    i => unreachable!("invalid Aho-Corasick pattern ID: {i}"),
                };

                Ok(Some((format, start as u64)))
            }
        }
    }
}
