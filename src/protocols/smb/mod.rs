//! SMB2/3 protocol boundary
//!
//! This module defines the traits a transport library implements so that the
//! virtual file adapter can drive it: connect, authenticate a session, attach
//! a share, then open/create/query/close individual remote objects. The wire
//! protocol itself lives behind [`SmbTransport`].
//!
//! [`memory::MemoryTransport`] is a complete in-memory implementation used by
//! the test suite.
//!
//! # Example
//!
//! ```
//! use orbit_smb_vfs::protocols::smb::{establish, AuthenticationContext, MemoryTransport, ShareTarget};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MemoryTransport::new();
//! transport.add_host("fileserver");
//! transport.add_user("fileserver", "jdoe", "secret");
//! transport.add_share("fileserver", "projects");
//!
//! let target = ShareTarget::new("fileserver", 445, "projects");
//! let auth = AuthenticationContext::new("jdoe", "secret", "");
//! let handle = establish(&transport, &target, &auth).await?;
//! assert!(handle.share().folder_exists("").await?);
//! handle.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod session;
pub mod types;

// Re-export key types
pub use error::*;
pub use memory::{MemoryTransport, ResourceCounts};
pub use session::{establish, ShareHandle};
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Entry point of a transport library: opens connections to hosts
#[async_trait]
pub trait SmbTransport: Send + Sync {
    /// Open a transport connection (negotiate included)
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn SmbConnection>>;
}

/// One negotiated transport connection
#[async_trait]
pub trait SmbConnection: Send + Sync {
    /// Run session setup with the given credentials
    async fn authenticate(&self, auth: &AuthenticationContext) -> Result<Box<dyn SmbSession>>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// An authenticated session on a connection
#[async_trait]
pub trait SmbSession: Send + Sync {
    /// Tree-connect to a disk share
    async fn connect_share(&self, share: &str) -> Result<Arc<dyn DiskShare>>;

    /// Log the session off. Logging off twice is a no-op.
    async fn logoff(&self) -> Result<()>;
}

/// An attached disk share. Paths are share-relative and `\`-separated; the
/// empty path is the share root.
#[async_trait]
pub trait DiskShare: Send + Sync {
    /// Whether `path` exists and is a non-directory
    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Whether `path` exists and is a directory
    async fn folder_exists(&self, path: &str) -> Result<bool>;

    /// Open or create a file
    async fn open_file(&self, path: &str, args: &OpenArgs) -> Result<Arc<dyn RemoteFile>>;

    /// Open or create a directory
    async fn open_directory(&self, path: &str, args: &OpenArgs)
        -> Result<Arc<dyn RemoteDirectory>>;

    /// Raw enumeration of a directory, `.` and `..` included
    async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>>;

    /// Delete a file
    async fn rm(&self, path: &str) -> Result<()>;

    /// Delete an empty directory
    async fn rmdir(&self, path: &str) -> Result<()>;

    /// Tree-disconnect. Disconnecting twice is a no-op.
    async fn disconnect(&self) -> Result<()>;
}

/// Operations common to every open handle
#[async_trait]
pub trait RemoteHandle: Send + Sync {
    /// Share-relative path the handle currently refers to
    fn path(&self) -> String;

    async fn query_info(&self) -> Result<FileInformation>;

    async fn set_basic_info(&self, info: &FileBasicInformation) -> Result<()>;

    /// Rename the open object (requires DELETE access)
    async fn rename(&self, new_path: &str, replace_if_exists: bool) -> Result<()>;

    /// Close the handle. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// An open file
#[async_trait]
pub trait RemoteFile: RemoteHandle {
    /// Read up to `len` bytes at `offset`; an empty result means end of file
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Write `data` at `offset`, returning the number of bytes written
    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize>;
}

/// An open directory
#[async_trait]
pub trait RemoteDirectory: RemoteHandle {
    /// Raw enumeration, `.` and `..` included
    async fn list(&self) -> Result<Vec<DirectoryEntry>>;
}
