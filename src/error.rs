//! Error types shared by every archive operation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building, generating, parsing or extracting archives.
#[derive(Debug, Error)]
pub enum ZipError {
    /// The path is empty, absolute, escapes its root or collides with another entry.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A codec failed while generating an archive.
    #[error("failed to compress {name:?}: {message}")]
    Compression { name: String, message: String },

    /// A compressed stream is truncated or malformed.
    #[error("corrupt compressed data: {0}")]
    CorruptData(String),

    /// The container itself cannot be parsed (missing or inconsistent records).
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The CRC32 stored for an entry does not match its decompressed content.
    #[error("CRC32 mismatch for {name:?}: expected {expected:#010x}, found {actual:#010x}")]
    Integrity {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// An error reported by the filesystem collaborator.
    #[error("{}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive needs a feature this crate does not write or read.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ZipError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        ZipError::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ZipError::MalformedArchive(message.into())
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ZipError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ZipError>;
