//! SMB error types

use std::io;
use thiserror::Error;

/// SMB-specific errors
///
/// All errors a transport may report to the adapter. Status codes of a
/// wire-level client map onto these variants.
#[derive(Error, Debug)]
pub enum SmbError {
    /// Credentials rejected during session setup
    #[error("authentication failed for {0}")]
    Auth(String),

    /// Access denied on a specific object or share
    #[error("permission denied: {0}")]
    Permission(String),

    /// Path not found
    #[error("path not found: {0}")]
    NotFound(String),

    /// Share does not exist on the server
    #[error("share not found: {0}")]
    ShareNotFound(String),

    /// Tree connect failed after a successful session setup
    #[error("cannot attach share {share}: {source}")]
    ShareAttach {
        share: String,
        #[source]
        source: Box<SmbError>,
    },

    /// Create disposition collided with an existing object
    #[error("object name collision: {0}")]
    ObjectNameCollision(String),

    /// Directory operation on a non-directory
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// File operation on a directory
    #[error("file is a directory: {0}")]
    FileIsADirectory(String),

    /// Directory still has children
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out at the transport level
    #[error("timeout")]
    Timeout,

    /// Connection error (unreachable host, dropped transport)
    #[error("connection error: {0}")]
    Connection(String),

    /// Handle, tree or session used after close
    #[error("handle closed: {0}")]
    Closed(String),

    /// Invalid path or target
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for SMB operations
pub type Result<T> = std::result::Result<T, SmbError>;

impl SmbError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SmbError::Timeout | SmbError::Connection(_) | SmbError::Io(_)
        )
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            SmbError::Permission(_) | SmbError::Auth(_) | SmbError::ShareAttach { .. }
        )
    }

    /// Check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, SmbError::NotFound(_) | SmbError::ShareNotFound(_))
    }
}

impl From<SmbError> for io::Error {
    fn from(err: SmbError) -> Self {
        let kind = match &err {
            SmbError::Io(e) => e.kind(),
            SmbError::NotFound(_) | SmbError::ShareNotFound(_) => io::ErrorKind::NotFound,
            SmbError::Permission(_) | SmbError::Auth(_) => io::ErrorKind::PermissionDenied,
            SmbError::ObjectNameCollision(_) => io::ErrorKind::AlreadyExists,
            SmbError::Timeout => io::ErrorKind::TimedOut,
            SmbError::Connection(_) | SmbError::Closed(_) => io::ErrorKind::ConnectionAborted,
            SmbError::InvalidPath(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        match err {
            SmbError::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SmbError::Auth(r"ACME\jdoe".to_string());
        assert_eq!(err.to_string(), r"authentication failed for ACME\jdoe");

        let err = SmbError::NotFound("docs\\a.txt".to_string());
        assert_eq!(err.to_string(), "path not found: docs\\a.txt");

        let err = SmbError::Protocol("invalid response".to_string());
        assert_eq!(err.to_string(), "protocol error: invalid response");
    }

    #[test]
    fn test_retryable() {
        assert!(SmbError::Timeout.is_retryable());
        assert!(SmbError::Connection("reset".to_string()).is_retryable());
        assert!(!SmbError::Auth("user".to_string()).is_retryable());
        assert!(!SmbError::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_classification() {
        assert!(SmbError::Permission("x".to_string()).is_permission_error());
        assert!(SmbError::ShareNotFound("x".to_string()).is_not_found());
        assert!(!SmbError::Timeout.is_not_found());
    }

    #[test]
    fn test_io_error_round_trip() {
        let io_err: io::Error = SmbError::NotFound("a.txt".to_string()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = SmbError::Permission("a.txt".to_string()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);

        let original = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let smb_err: SmbError = original.into();
        let back: io::Error = smb_err.into();
        assert_eq!(back.kind(), io::ErrorKind::BrokenPipe);
    }
}
