//! RAR archive written with RAR 5.0 and later.
//!
//! Blocks are framed with variable-length integers instead of the fixed
//! RAR15 layout: a CRC32, the header size as a vint, then vint-encoded type
//! and flags, optionally followed by an extra area and a data area.

mod blocks;
mod parser;

pub use blocks::*;
pub use parser::*;

const MAX_PATH_SIZE: u64 = 0x10000;
