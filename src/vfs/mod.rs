//! Virtual file layer over SMB shares
//!
//! A file framework owns one [`SmbFileObject`] per virtual name and drives it
//! through the [`FileObjectOps`] callbacks:
//!
//! ```text
//! attach → { get_type, list_children, read, write, delete, rename, ... }* → detach
//! ```
//!
//! Objects get their share handles from the [`SmbFileSystem`] they were
//! resolved by. Handles are shared between objects that address the same
//! share with the same credentials.
//!
//! # Example
//!
//! ```
//! use orbit_smb_vfs::protocols::smb::MemoryTransport;
//! use orbit_smb_vfs::vfs::{FileType, SmbFileSystem, SmbFileSystemOptions};
//! use std::sync::Arc;
//! use tokio::io::AsyncReadExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MemoryTransport::new();
//! transport.add_host("fileserver");
//! transport.add_share("fileserver", "public");
//! transport.add_file("fileserver", "public", "notes.txt", b"hi");
//!
//! let fs = SmbFileSystem::new(Arc::new(transport), SmbFileSystemOptions::default());
//! let mut file = fs.resolve_uri("smb://fileserver/public/notes.txt")?;
//! assert_eq!(file.get_type().await?, FileType::File);
//!
//! let mut input = file.get_input_stream().await?;
//! let mut text = String::new();
//! input.read_to_string(&mut text).await?;
//! input.close().await?;
//! assert_eq!(text, "hi");
//!
//! file.detach().await?;
//! fs.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod filesystem;
pub mod name;
pub mod object;
pub mod pool;
pub mod stream;

pub use filesystem::{SmbFileSystem, SmbFileSystemOptions};
pub use name::{EmbeddedCredentials, ResolvedName, SmbFileName};
pub use object::SmbFileObject;
pub use pool::{ShareHandleCache, ShareLease};
pub use stream::{SmbInputStream, SmbOutputStream, SmbRandomAccessContent};

use crate::error::VfsResult;
use async_trait::async_trait;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

/// Kind of object behind a virtual name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    File,
    Folder,
    /// Nothing exists at the name (yet)
    Imaginary,
}

impl FileType {
    pub fn exists(self) -> bool {
        !matches!(self, FileType::Imaginary)
    }
}

/// Access requested for random access content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RandomAccessMode {
    Read,
    ReadWrite,
}

impl RandomAccessMode {
    pub fn can_write(self) -> bool {
        matches!(self, RandomAccessMode::ReadWrite)
    }
}

/// Callbacks a file framework invokes on the object behind one name
///
/// Operations take `&mut self`: a single object is never driven by two
/// callers at once.
#[async_trait]
pub trait FileObjectOps: Send {
    /// Name type accepted as a rename target
    type Name: Send + Sync;
    type InputStream: AsyncRead + Send + Unpin;
    type OutputStream: AsyncWrite + Send + Unpin;
    type RandomAccess: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin;

    /// Establish remote state. Idempotent; never creates remote objects.
    async fn attach(&mut self) -> VfsResult<()>;

    /// Release remote state acquired by `attach`
    async fn detach(&mut self) -> VfsResult<()>;

    async fn get_type(&mut self) -> VfsResult<FileType>;

    /// Base names of the children, without `.` and `..`
    async fn list_children(&mut self) -> VfsResult<Vec<String>>;

    async fn is_hidden(&mut self) -> VfsResult<bool>;

    async fn delete(&mut self) -> VfsResult<()>;

    async fn rename(&mut self, target: &Self::Name) -> VfsResult<()>;

    async fn create_folder(&mut self) -> VfsResult<()>;

    async fn get_content_size(&mut self) -> VfsResult<u64>;

    async fn get_last_modified_time(&mut self) -> VfsResult<SystemTime>;

    async fn set_last_modified_time(&mut self, time: SystemTime) -> VfsResult<()>;

    async fn get_input_stream(&mut self) -> VfsResult<Self::InputStream>;

    async fn get_output_stream(&mut self, append: bool) -> VfsResult<Self::OutputStream>;

    async fn get_random_access_content(
        &mut self,
        mode: RandomAccessMode,
    ) -> VfsResult<Self::RandomAccess>;
}
