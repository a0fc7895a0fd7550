//! SMB protocol types shared by the transport boundary and the adapter
//!
//! Flag values follow MS-SMB2 / MS-FSCC so that a wire-level transport can
//! pass them through unchanged.

use secrecy::{ExposeSecret, SecretString};
use std::time::SystemTime;

/// Default SMB port (direct TCP transport)
pub const DEFAULT_SMB_PORT: u16 = 445;

bitflags::bitflags! {
    /// Access rights requested when opening a remote object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMask: u32 {
        const FILE_READ_DATA        = 0x0000_0001;
        const FILE_WRITE_DATA       = 0x0000_0002;
        const FILE_APPEND_DATA      = 0x0000_0004;
        const FILE_READ_EA          = 0x0000_0008;
        const FILE_WRITE_EA         = 0x0000_0010;
        const FILE_READ_ATTRIBUTES  = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE                = 0x0001_0000;
        const READ_CONTROL          = 0x0002_0000;
        const SYNCHRONIZE           = 0x0010_0000;
        const MAXIMUM_ALLOWED       = 0x0200_0000;
        const GENERIC_ALL           = 0x1000_0000;
        const GENERIC_WRITE         = 0x4000_0000;
        const GENERIC_READ          = 0x8000_0000;
    }
}

impl AccessMask {
    /// Whether the mask grants reading file content
    pub fn can_read_data(self) -> bool {
        self.intersects(Self::FILE_READ_DATA | Self::GENERIC_READ | Self::GENERIC_ALL)
    }

    /// Whether the mask grants writing file content
    pub fn can_write_data(self) -> bool {
        self.intersects(
            Self::FILE_WRITE_DATA | Self::FILE_APPEND_DATA | Self::GENERIC_WRITE | Self::GENERIC_ALL,
        )
    }

    /// Whether the mask grants reading attributes and timestamps
    pub fn can_read_attributes(self) -> bool {
        self.intersects(Self::FILE_READ_ATTRIBUTES | Self::GENERIC_READ | Self::GENERIC_ALL)
    }

    /// Whether the mask grants changing attributes and timestamps
    pub fn can_write_attributes(self) -> bool {
        self.intersects(Self::FILE_WRITE_ATTRIBUTES | Self::GENERIC_WRITE | Self::GENERIC_ALL)
    }

    /// Whether the mask grants delete/rename
    pub fn can_delete(self) -> bool {
        self.intersects(Self::DELETE | Self::GENERIC_ALL)
    }
}

bitflags::bitflags! {
    /// MS-FSCC file attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READONLY  = 0x0000_0001;
        const HIDDEN    = 0x0000_0002;
        const SYSTEM    = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE   = 0x0000_0020;
        const NORMAL    = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
    }
}

bitflags::bitflags! {
    /// Sharing mode granted to other openers of the same object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShareAccess: u32 {
        const READ   = 0x0000_0001;
        const WRITE  = 0x0000_0002;
        const DELETE = 0x0000_0004;
    }
}

bitflags::bitflags! {
    /// Create options (subset used by this crate)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE     = 0x0000_0001;
        const WRITE_THROUGH      = 0x0000_0002;
        const NON_DIRECTORY_FILE = 0x0000_0040;
    }
}

/// Open-vs-create policy applied when opening a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateDisposition {
    /// Replace if it exists, create otherwise
    Supersede,
    /// Open an existing object, fail if absent
    Open,
    /// Create a new object, fail if it exists
    Create,
    /// Open if it exists, create otherwise
    OpenIf,
    /// Open and truncate an existing object, fail if absent
    Overwrite,
    /// Open and truncate if it exists, create otherwise
    OverwriteIf,
}

impl CreateDisposition {
    /// Whether this disposition may bring a new object into existence
    pub fn may_create(self) -> bool {
        !matches!(self, Self::Open | Self::Overwrite)
    }

    /// Whether this disposition may be satisfied by an existing object
    pub fn may_open_existing(self) -> bool {
        !matches!(self, Self::Create)
    }

    /// Whether an existing object is truncated
    pub fn truncates(self) -> bool {
        matches!(self, Self::Supersede | Self::Overwrite | Self::OverwriteIf)
    }
}

/// Full argument set of a create/open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenArgs {
    pub access: AccessMask,
    pub attributes: FileAttributes,
    pub share_access: ShareAccess,
    pub disposition: CreateDisposition,
    pub options: CreateOptions,
}

impl OpenArgs {
    /// Arguments with normal attributes and full sharing
    pub fn new(access: AccessMask, disposition: CreateDisposition) -> Self {
        Self {
            access,
            attributes: FileAttributes::NORMAL,
            share_access: ShareAccess::all(),
            disposition,
            options: CreateOptions::empty(),
        }
    }

    /// Open an existing object with the given access
    pub fn open_existing(access: AccessMask) -> Self {
        Self::new(access, CreateDisposition::Open)
    }

    /// Builder: restrict to non-directory objects
    pub fn file(mut self) -> Self {
        self.options.remove(CreateOptions::DIRECTORY_FILE);
        self.options.insert(CreateOptions::NON_DIRECTORY_FILE);
        self
    }

    /// Builder: restrict to directories
    pub fn directory(mut self) -> Self {
        self.options.remove(CreateOptions::NON_DIRECTORY_FILE);
        self.options.insert(CreateOptions::DIRECTORY_FILE);
        self.attributes = FileAttributes::DIRECTORY;
        self
    }
}

/// One entry of a raw directory enumeration
///
/// Raw enumerations include the `.` and `..` pseudo-entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub file_name: String,
    pub attributes: FileAttributes,
    pub end_of_file: u64,
    pub last_write_time: Option<SystemTime>,
}

impl DirectoryEntry {
    /// Whether this is the self or parent pseudo-entry
    pub fn is_pseudo(&self) -> bool {
        self.file_name == "." || self.file_name == ".."
    }
}

/// Combined basic + standard file information of an open handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInformation {
    /// Logical size in bytes (0 for directories)
    pub end_of_file: u64,
    pub attributes: FileAttributes,
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
    pub change_time: Option<SystemTime>,
}

impl FileInformation {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(FileAttributes::HIDDEN)
    }
}

/// Basic information update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBasicInformation {
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
    pub change_time: Option<SystemTime>,
    pub attributes: Option<FileAttributes>,
}

/// Host + share addressed by a share handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareTarget {
    /// Hostname or IP address (e.g., "fileserver.acme.corp")
    pub host: String,

    /// SMB port
    pub port: u16,

    /// Share name (e.g., "projects")
    pub share: String,
}

impl ShareTarget {
    pub fn new(host: impl Into<String>, port: u16, share: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            share: share.into(),
        }
    }

    /// UNC form used in logs and error messages: `\\host\share`
    pub fn unc(&self) -> String {
        format!(r"\\{}\{}", self.host, self.share)
    }
}

/// Credentials handed to the session setup
///
/// The password is held in a [`SecretString`], which zeroes its memory on
/// drop and redacts itself from `Debug` output.
#[derive(Debug)]
pub struct AuthenticationContext {
    pub username: String,
    pub password: SecretString,
    pub domain: String,
}

impl AuthenticationContext {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            domain: domain.into(),
        }
    }

    /// Guest/anonymous session (empty user name)
    pub fn anonymous() -> Self {
        Self::new("", "", "")
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// `DOMAIN\user` (or just `user`) for diagnostics
    pub fn principal(&self) -> String {
        if self.domain.is_empty() {
            self.username.clone()
        } else {
            format!(r"{}\{}", self.domain, self.username)
        }
    }

    pub(crate) fn password_matches(&self, expected: &SecretString) -> bool {
        self.password.expose_secret() == expected.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_context_debug_redacts_password() {
        let ctx = AuthenticationContext::new("jdoe", "password123", "ACME");
        let debug_str = format!("{:?}", ctx);
        assert!(!debug_str.contains("password123"));
        assert!(debug_str.contains("jdoe"));
        assert_eq!(ctx.principal(), r"ACME\jdoe");
    }

    #[test]
    fn test_access_mask_generic_rights() {
        let read = AccessMask::FILE_READ_DATA | AccessMask::FILE_READ_ATTRIBUTES;
        assert!(read.can_read_attributes());
        assert!(!read.can_write_data());
        assert!(AccessMask::GENERIC_ALL.can_delete());
        assert!(!AccessMask::FILE_WRITE_DATA.can_delete());
    }

    #[test]
    fn test_disposition_semantics() {
        assert!(CreateDisposition::Create.may_create());
        assert!(!CreateDisposition::Create.may_open_existing());
        assert!(!CreateDisposition::Open.may_create());
        assert!(CreateDisposition::Overwrite.truncates());
        assert!(!CreateDisposition::OpenIf.truncates());
    }

    #[test]
    fn test_open_args_builders() {
        let dir = OpenArgs::new(AccessMask::FILE_READ_ATTRIBUTES, CreateDisposition::OpenIf).directory();
        assert!(dir.options.contains(CreateOptions::DIRECTORY_FILE));
        assert_eq!(dir.share_access, ShareAccess::all());

        let file = dir.file();
        assert!(!file.options.contains(CreateOptions::DIRECTORY_FILE));
        assert!(file.options.contains(CreateOptions::NON_DIRECTORY_FILE));
    }

    #[test]
    fn test_share_target_unc() {
        let target = ShareTarget::new("fileserver", DEFAULT_SMB_PORT, "projects");
        assert_eq!(target.unc(), r"\\fileserver\projects");
    }
}
