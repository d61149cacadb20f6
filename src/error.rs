//! Error types for the compressor and archiver.
//!
//! Every fallible operation returns [`Result`]. Format and authentication problems are
//! reported before any body bytes are decoded, so a caller sees either a complete result
//! or one of these errors.

use std::io;

use thiserror::Error;

/// Top-level error type for all operations.
#[derive(Debug, Error)]
pub enum Error {
    /// There were no bytes to compress.
    #[error("no input data to compress")]
    EmptyInput,

    /// Bad magic, truncated header, unreadable index or undecodable payload.
    #[error("corrupt or unrecognised format: {0}")]
    CorruptFormat(String),

    /// The requested name is not in the archive index.
    #[error("entry '{0}' not found in archive")]
    EntryNotFound(String),

    /// The container is password protected and no password was supplied.
    #[error("a password is required to open this container")]
    MissingPassword,

    /// The supplied password does not match the stored hash.
    #[error("incorrect password")]
    IncorrectPassword,

    /// The operation was cancelled at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// File or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Convenience constructor for [`Error::CorruptFormat`].
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::CorruptFormat(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps an unexpected end of file while parsing `what` to [`Error::CorruptFormat`].
/// Any other I/O failure passes through unchanged.
pub(crate) fn truncated(what: &str) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::CorruptFormat(format!("truncated {}", what))
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eof_maps_to_corrupt_test() {
        let e = truncated("index")(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(e, Error::CorruptFormat(ref m) if m == "truncated index"));
    }

    #[test]
    fn other_io_passes_through_test() {
        let e = truncated("index")(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(e, Error::Io(_)));
    }
}
