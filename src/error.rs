use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or reading a LevelDB store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The directory is missing, unreadable, locked, or not a LevelDB store.
    #[error("could not open store at {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    /// On-disk data did not match the LevelDB format.
    #[error("corrupted store data: {0}")]
    Corruption(String),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn open_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corruption(reason: impl Into<String>) -> Self {
        StoreError::Corruption(reason.into())
    }
}

/// A key matched but its value could not be decoded into a ciphertext record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed ciphertext record: {0}")]
pub struct MalformedRecord(pub String);

/// Decryption failed. A wrong password, corrupted ciphertext and a wrong
/// nonce all look the same.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("incorrect password or corrupted data")]
pub struct AuthenticationFailed;
