use std::io;

use thiserror::Error;

/// Specialized [`Result`] type for reading archive metadata.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
/// A fatal error that may occur while reading archive metadata.
pub enum Error {
    /// The magic bytes at the start of the stream do not match the expected
    /// format signature.
    #[error("signature does not match the expected archive format")]
    InvalidSignature,

    /// Tried to read after the end of the stream while a frame was expected.
    #[error("expected more data")]
    UnexpectedEof,

    /// A block header reported sizes that are 0, inconsistent or exceeding
    /// the EOF.
    #[error("header reported sizes are 0, inconsistent or exceed the EOF")]
    CorruptHeader,

    /// The archive uses a feature this crate does not read.
    #[error("unsupported archive feature: {0}")]
    Unsupported(&'static str),

    /// The PAR2 stream contains a missing or corrupt packet.
    #[error("invalid PAR2 stream: {0}")]
    InvalidPar2(&'static str),

    /// Neither the volume filenames nor the magic bytes match a known format.
    #[error("could not determine the archive format")]
    UnknownFormat,

    /// Unknown I/O error.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            _ => Self::Io(value),
        }
    }
}
