//! Error types for the BGV refresh library.
//!
//! Every fallible operation returns [`Result`]. Errors are surfaced to the
//! caller without retry; an error in the middle of a bootstrap leaves the
//! target ciphertext invalid and the caller must discard it.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds raised by ciphertext arithmetic, digit extraction and
/// bootstrapping.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument is out of range or malformed, e.g. raising
    /// a ciphertext to a non-positive power or mod-switching up to a prime
    /// set that does not contain the current one.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two ciphertexts cannot be combined because neither handle list is a
    /// prefix of the other.
    #[error("incompatible secret-key handles: {0}")]
    IncompatibleHandles(String),

    /// Two ciphertexts cannot be added because their plaintext spaces
    /// differ.
    #[error("plaintext space mismatch: {left} vs {right}")]
    PtxtSpaceMismatch { left: u64, right: u64 },

    /// An operation was requested in a state that does not support it, e.g.
    /// bootstrapping without refresh data, or dividing by p a ciphertext
    /// whose plaintext space is not divisible by p.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The scaled noise after the raw mod-switch exceeds the bound assumed
    /// during parameter selection. Fatal: the refreshed ciphertext would not
    /// decrypt.
    #[error("raw mod-switch noise exceeds bound by factor {ratio:.3}")]
    NoiseBoundExceeded { ratio: f64 },

    /// Digit extraction required a lifting polynomial that is not present
    /// in the cache.
    #[error("missing lifting polynomial for p={p}, e_inner={e_inner}, precision={precision}")]
    MissingLiftingPolynomial { p: u64, e_inner: usize, precision: usize },

    /// Serialization or deserialization failed: missing or mismatched
    /// eye-catcher, version mismatch, or corrupt payload.
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Shorthand for building an [`Error::InvalidArgument`].
macro_rules! arg_err {
    ($($t:tt)*) => {
        $crate::error::Error::InvalidArgument(format!($($t)*))
    };
}

/// Shorthand for building an [`Error::InvalidState`].
macro_rules! state_err {
    ($($t:tt)*) => {
        $crate::error::Error::InvalidState(format!($($t)*))
    };
}

pub(crate) use arg_err;
pub(crate) use state_err;
