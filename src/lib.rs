/*!
 * Orbit SMB VFS - SMB shares behind a virtual file abstraction
 *
 * Maps path-based file operations onto the stateful SMB2/3 model:
 * - Connect, authenticate and attach shares lazily, sharing handles per share
 * - Answer file / folder / imaginary type checks without creating anything
 * - Directory listing, delete, create folder and in-share rename
 * - Streaming and random-access content over open remote handles
 * - Real remote metadata (size, modification time, hidden attribute)
 *
 * The wire protocol sits behind the `protocols::smb` transport traits; an
 * in-memory transport ships for tests and embedders.
 */

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocols;
pub mod vfs;

// Re-export commonly used types
pub use auth::{AuthDataKind, StaticUserAuthenticator, UserAuthenticationData, UserAuthenticator};
pub use config::{LogConfig, LogLevel, SmbVfsConfig};
pub use error::{VfsError, VfsResult};
pub use vfs::{
    FileObjectOps, FileType, RandomAccessMode, SmbFileName, SmbFileObject, SmbFileSystem,
    SmbFileSystemOptions,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
