//! Error types for TagFS

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagFsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Extraction error for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Invalid source directory: {0}")]
    InvalidSource(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TagFsError>;

/// Failures surfaced to filesystem clients. Each maps onto one errno.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("read-only file system")]
    ReadOnly,

    #[error("input/output error")]
    Io,

    #[error("no such attribute")]
    NoAttribute,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,
}

impl FsError {
    pub fn errno(self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::ReadOnly => libc::EROFS,
            FsError::Io => libc::EIO,
            FsError::NoAttribute => libc::ENODATA,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::IsDirectory => libc::EISDIR,
        }
    }
}
