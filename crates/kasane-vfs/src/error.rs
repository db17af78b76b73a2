//! VFS error types.

use std::io;
use thiserror::Error;

use crate::path::VfsPath;
use crate::types::FileType;

/// Boxed error from a backend hook, kept as the source of [`VfsError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// VFS error type.
///
/// Every variant names the path involved, and most name the operation that
/// was attempted.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The backend does not implement this hook.
    #[error("{op} is not supported for {path}")]
    Unsupported { op: &'static str, path: String },

    /// File does not exist.
    #[error("cannot {op} {path}: file does not exist")]
    NotFound { op: &'static str, path: String },

    /// Expected a folder.
    #[error("cannot {op} {path}: not a folder")]
    NotAFolder { op: &'static str, path: String },

    /// Expected a file.
    #[error("cannot {op} {path}: is a folder")]
    IsAFolder { op: &'static str, path: String },

    /// File exists with another type.
    #[error("cannot create {path} as {requested}: it already exists as {existing}")]
    TypeMismatch {
        path: String,
        requested: FileType,
        existing: FileType,
    },

    /// File is read-only.
    #[error("cannot {op} {path}: read-only")]
    ReadOnly { op: &'static str, path: String },

    /// A stream is already open on this file's content.
    #[error("a stream is already open for {path}")]
    StreamInUse { path: String },

    /// A backend hook failed with a non-VFS error.
    #[error("failed to {op} {path}")]
    Backend {
        op: &'static str,
        path: String,
        #[source]
        source: BoxError,
    },

    /// Content copy failed part way through.
    #[error("failed to copy {src} to {dest}")]
    Copy {
        src: String,
        dest: String,
        #[source]
        source: io::Error,
    },

    /// Invalid path, or a path outside the requested scope.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The owning file system was dropped while the node was still in use.
    #[error("file system for {path} has been dropped")]
    FileSystemDropped { path: String },

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VfsError {
    /// Create an Unsupported error.
    pub fn unsupported(op: &'static str, path: &VfsPath) -> Self {
        Self::Unsupported {
            op,
            path: path.to_string(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(op: &'static str, path: &VfsPath) -> Self {
        Self::NotFound {
            op,
            path: path.to_string(),
        }
    }

    /// Create a NotAFolder error.
    pub fn not_a_folder(op: &'static str, path: &VfsPath) -> Self {
        Self::NotAFolder {
            op,
            path: path.to_string(),
        }
    }

    /// Create an IsAFolder error.
    pub fn is_a_folder(op: &'static str, path: &VfsPath) -> Self {
        Self::IsAFolder {
            op,
            path: path.to_string(),
        }
    }

    /// Create a ReadOnly error.
    pub fn read_only(op: &'static str, path: &VfsPath) -> Self {
        Self::ReadOnly {
            op,
            path: path.to_string(),
        }
    }

    /// Create a StreamInUse error.
    pub fn stream_in_use(path: &VfsPath) -> Self {
        Self::StreamInUse {
            path: path.to_string(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Returns a closure that normalizes a hook error for `op` on `path`.
    ///
    /// A [`VfsError`] raised by the hook is returned unchanged; anything else
    /// becomes [`VfsError::Backend`].
    pub fn from_hook<'a>(
        op: &'static str,
        path: &'a VfsPath,
    ) -> impl FnOnce(anyhow::Error) -> Self + 'a {
        move |err| match err.downcast::<VfsError>() {
            Ok(vfs) => vfs,
            Err(other) => Self::Backend {
                op,
                path: path.to_string(),
                source: other.into(),
            },
        }
    }

    /// Returns true if this error reports a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convert VfsError to std::io::Error for stream adapters.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(e) => e,
            VfsError::Copy { source, .. } => source,
            e @ VfsError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, e),
            e @ VfsError::NotAFolder { .. } => io::Error::new(io::ErrorKind::NotADirectory, e),
            e @ VfsError::IsAFolder { .. } => io::Error::new(io::ErrorKind::IsADirectory, e),
            e @ VfsError::ReadOnly { .. } => io::Error::new(io::ErrorKind::PermissionDenied, e),
            e @ VfsError::Unsupported { .. } => io::Error::new(io::ErrorKind::Unsupported, e),
            e @ VfsError::StreamInUse { .. } => io::Error::new(io::ErrorKind::ResourceBusy, e),
            e @ VfsError::InvalidPath { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
            e @ VfsError::TypeMismatch { .. } => io::Error::new(io::ErrorKind::AlreadyExists, e),
            e => io::Error::other(e),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
