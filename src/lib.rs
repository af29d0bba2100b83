//! Byte-exact file listings for multi-volume RAR and 7z archives.
//!
//! Nothing is ever decompressed or verified: the parsers only walk the
//! header structures and report, for every archived file, where its bytes
//! live in the concatenation of the volumes.

#[macro_use]
mod macros;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod par2;
pub mod rar15;
pub mod rar50;
mod read;
pub mod sevenzip;
mod signature;
mod size;
mod time_conv;
pub mod volume;

pub use dispatch::list_files;
pub use entry::{FileEntry, HostOs, ModificationTime, RarFileEntry, SevenZipFileEntry, SplitPart};
pub use error::{Error, Result};
pub use signature::Signature;
pub use volume::{Concat, VolumeDescriptor};
