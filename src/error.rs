/*!
 * Error types for the SMB virtual file adapter
 */

use crate::protocols::smb::SmbError;
use std::io;
use thiserror::Error;

pub type VfsResult<T> = std::result::Result<T, VfsError>;

/// Errors reported by the adapter to the file framework
///
/// A missing remote object is not an error: type checks report it as
/// [`crate::vfs::FileType::Imaginary`].
#[derive(Error, Debug)]
pub enum VfsError {
    /// Host unreachable or transport failure
    #[error("cannot connect to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// Credentials rejected by the server
    #[error("authentication failed on {endpoint} for {principal}")]
    Authentication { endpoint: String, principal: String },

    /// Session established but the share could not be attached
    #[error("cannot attach share {share}: {message}")]
    ShareAttach { share: String, message: String },

    /// Malformed name or in-share path
    #[error("cannot resolve {path}: {reason}")]
    PathResolution { path: String, reason: String },

    /// Remote object does not exist
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Path reported as both a file and a directory
    #[error("{path} exists as both a file and a directory")]
    TypeConflict { path: String },

    /// Directory operation on something that is not a directory
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Content operation on something that is not a file
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// Creation blocked by an existing object of the other kind
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// Access denied on an object
    #[error("permission denied on {path}: {message}")]
    Permission { path: String, message: String },

    /// Any other protocol failure
    #[error("protocol error on {path}: {message}")]
    Protocol { path: String, message: String },

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl VfsError {
    pub fn path_resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        VfsError::PathResolution {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Map a protocol error raised while operating on `path`
    pub fn from_smb(err: SmbError, path: &str) -> Self {
        let path = path.to_string();
        match err {
            SmbError::NotFound(_) | SmbError::ShareNotFound(_) => VfsError::NotFound { path },
            SmbError::Permission(message) => VfsError::Permission { path, message },
            SmbError::ObjectNameCollision(_) => VfsError::AlreadyExists { path },
            SmbError::NotADirectory(_) => VfsError::NotADirectory { path },
            SmbError::FileIsADirectory(_) => VfsError::NotAFile { path },
            SmbError::InvalidPath(reason) => VfsError::PathResolution { path, reason },
            SmbError::Connection(message) => VfsError::Connection {
                endpoint: path,
                message,
            },
            SmbError::Timeout => VfsError::Connection {
                endpoint: path,
                message: "timed out".to_string(),
            },
            SmbError::Io(e) => VfsError::Io(e),
            other => VfsError::Protocol {
                path,
                message: other.to_string(),
            },
        }
    }

    /// Map a share establishment error for `endpoint` (`\\host\share`)
    pub fn from_establish(err: SmbError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        match err {
            SmbError::Auth(principal) => VfsError::Authentication {
                endpoint,
                principal,
            },
            SmbError::ShareAttach { share, source } => VfsError::ShareAttach {
                share,
                message: source.to_string(),
            },
            SmbError::InvalidPath(reason) => VfsError::PathResolution {
                path: endpoint,
                reason,
            },
            SmbError::Connection(message) => VfsError::Connection { endpoint, message },
            SmbError::Timeout => VfsError::Connection {
                endpoint,
                message: "timed out".to_string(),
            },
            SmbError::Io(e) => VfsError::Connection {
                endpoint,
                message: e.to_string(),
            },
            other => VfsError::Protocol {
                path: endpoint,
                message: other.to_string(),
            },
        }
    }

    /// Check if this error is transient (worth retrying by the caller)
    pub fn is_retryable(&self) -> bool {
        matches!(self, VfsError::Connection { .. } | VfsError::Io(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }

    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            VfsError::Permission { .. }
                | VfsError::Authentication { .. }
                | VfsError::ShareAttach { .. }
        )
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        let kind = match &err {
            VfsError::Io(e) => e.kind(),
            VfsError::NotFound { .. } => io::ErrorKind::NotFound,
            VfsError::Permission { .. } | VfsError::Authentication { .. } => {
                io::ErrorKind::PermissionDenied
            }
            VfsError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            VfsError::Connection { .. } => io::ErrorKind::ConnectionRefused,
            VfsError::PathResolution { .. } | VfsError::Config(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        match err {
            VfsError::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}
