//! PAR2 packet-stream parsing.
//!
//! A PAR2 index maps every file of a release to the MD5 of its first 16KiB,
//! which is what lets the dispatcher recover the original names of
//! obfuscated volumes. Only file description packets are decoded; recovery
//! data is skipped.

use crate::error::{Error, Result};

const PACKET_MAGIC: &[u8; 8] = b"PAR2\0PKT";
const TYPE_FILE_DESCRIPTION: &[u8; 16] = b"PAR 2.0\0FileDesc";

/// `magic(8) | length(8) | packet_hash(16) | recovery_set_id(16) | type(16)`.
const PACKET_HEADER_SIZE: usize = 64;

/// Packets are aligned, so up to 3 padding bytes may separate them.
const MAX_PACKET_PADDING: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A file description packet: the identity of one file of the release.
pub struct FileDescription {
    /// Identifier of the file within the recovery set.
    pub file_id: [u8; 16],

    /// MD5 hash of the entire file.
    pub file_hash: [u8; 16],

    /// MD5 hash of the first 16KiB of the file.
    pub hash_16k: [u8; 16],

    pub file_size: u64,

    /// Original filename, trimmed at the first NUL.
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The file descriptions found in a PAR2 stream.
pub struct Par2Info {
    /// Recovery set the packets belong to; taken from the first packet.
    pub recovery_set_id: [u8; 16],

    pub files: Vec<FileDescription>,
}

impl Par2Info {
    /// Find the description whose first-16KiB hash matches `hash_16k`.
    pub fn find_by_hash_16k(&self, hash_16k: &[u8; 16]) -> Option<&FileDescription> {
        self.files.iter().find(|f| &f.hash_16k == hash_16k)
    }
}

/// Parse a PAR2 packet stream.
///
/// Invalid magic bytes or truncated packets fail; unknown packet types are
/// skipped by their declared length.
pub fn parse(bytes: &[u8]) -> Result<Par2Info> {
    let mut position = 0;
    let mut recovery_set_id = None;
    let mut files = vec![];

    while position < bytes.len() {
        // Trailing alignment bytes after the last packet.
        if bytes.len() - position <= MAX_PACKET_PADDING
            && bytes[position..].iter().all(|&b| b == 0)
        {
            break;
        }

        let start = (0..=MAX_PACKET_PADDING)
            .map(|padding| position + padding)
            .find(|&p| {
                bytes
                    .get(p..p + PACKET_MAGIC.len())
                    .is_some_and(|window| window == PACKET_MAGIC)
            })
            .ok_or(Error::InvalidPar2("packet magic not found"))?;

        if start + PACKET_HEADER_SIZE > bytes.len() {
            return Err(Error::InvalidPar2("truncated packet header"));
        }

        let length =
            u64::from_le_bytes(bytes[start + 8..start + 16].try_into().unwrap()) as usize;
        if length < PACKET_HEADER_SIZE {
            return Err(Error::InvalidPar2("packet length smaller than its header"));
        }
        if start + length > bytes.len() {
            return Err(Error::InvalidPar2("truncated packet"));
        }

        if recovery_set_id.is_none() {
            recovery_set_id = Some(bytes[start + 32..start + 48].try_into().unwrap());
        }

        if &bytes[start + 48..start + 64] == TYPE_FILE_DESCRIPTION {
            files.push(parse_file_description(
                &bytes[start + PACKET_HEADER_SIZE..start + length],
            )?);
        }

        position = start + length;
    }

    Ok(Par2Info {
        recovery_set_id: recovery_set_id.ok_or(Error::InvalidPar2("no packets found"))?,
        files,
    })
}

/// `file_id(16) | file_hash(16) | hash_16k(16) | file_size(8) | filename`.
fn parse_file_description(body: &[u8]) -> Result<FileDescription> {
    if body.len() < 56 {
        return Err(Error::InvalidPar2("file description packet too small"));
    }

    let name_bytes = &body[56..];
    let name_end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());

    Ok(FileDescription {
        file_id: body[0..16].try_into().unwrap(),
        file_hash: body[16..32].try_into().unwrap(),
        hash_16k: body[32..48].try_into().unwrap(),
        file_size: u64::from_le_bytes(body[48..56].try_into().unwrap()),
        file_name: String::from_utf8_lossy(&name_bytes[..name_end]).into_owned(),
    })
}
