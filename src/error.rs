//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout amiikit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// None of these are fatal: a failed call leaves loaded keys and the caller's
/// output buffer exactly as they were.
#[derive(Debug)]
pub enum Error {
    /// A master-key record was not the size the key derivation expects.
    InvalidKeyLength { expected: usize, got: usize },
    /// A master-key record had the right size but inconsistent contents.
    InvalidKey(&'static str),
    /// A pack/unpack was requested before both key halves were loaded.
    KeysNotLoaded,
    /// A dump buffer was smaller than the fixed dump size, or an output
    /// buffer did not match the length of its input.
    SizeMismatch { expected: usize, got: usize },
    /// The recomputed tag or data HMAC did not match the stored one.
    AuthenticationFailed,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidKeyLength { expected, got } => {
                write!(f, "invalid key length: expected {expected} bytes, got {got}")
            }
            Error::InvalidKey(s) => write!(f, "invalid key: {s}"),
            Error::KeysNotLoaded => write!(f, "keys not loaded"),
            Error::SizeMismatch { expected, got } => {
                write!(f, "buffer size mismatch: expected {expected} bytes, got {got}")
            }
            Error::AuthenticationFailed => write!(f, "HMAC verification failed"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_sizes() {
        let e = Error::SizeMismatch {
            expected: 540,
            got: 12,
        };
        assert_eq!(
            e.to_string(),
            "buffer size mismatch: expected 540 bytes, got 12"
        );
    }

    #[test]
    fn io_error_is_source() {
        let e = Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(std::error::Error::source(&e).is_some());
        assert!(std::error::Error::source(&Error::AuthenticationFailed).is_none());
    }
}
