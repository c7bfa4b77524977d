use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection already exists at '{0}'")]
    AlreadyExists(PathBuf),
    #[error("Collection not found at '{0}'")]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("'{0}' is not a conformation collection (bad file header)")]
    BadHeader(PathBuf),
    #[error("Unsupported collection format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("Corrupt frame at byte offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    #[error("Failed to encode record '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: bincode::error::EncodeError,
    },
    #[error("Failed to decode frame at byte offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: bincode::error::DecodeError,
    },
    #[error("Collection '{0}' is opened read-only")]
    ReadOnly(PathBuf),
}
