//! File system context
//!
//! [`SmbFileSystem`] ties together the transport, the configuration, the
//! optional authenticator and the share handle cache. File objects are
//! created from it and acquire their share handles through it.

use std::fmt;
use std::sync::Arc;

use super::name::{ResolvedName, SmbFileName};
use super::object::SmbFileObject;
use super::pool::{ShareHandleCache, ShareLease};
use crate::auth::{resolve_credentials, UserAuthenticator};
use crate::config::SmbVfsConfig;
use crate::error::VfsResult;
use crate::protocols::smb::SmbTransport;

/// Options a file system is created with
#[derive(Clone, Default)]
pub struct SmbFileSystemOptions {
    pub config: SmbVfsConfig,
    pub authenticator: Option<Arc<dyn UserAuthenticator>>,
}

impl fmt::Debug for SmbFileSystemOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbFileSystemOptions")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator.is_some())
            .finish()
    }
}

impl SmbFileSystemOptions {
    pub fn with_config(mut self, config: SmbVfsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn UserAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }
}

/// Shared context of all file objects on one transport
#[derive(Debug)]
pub struct SmbFileSystem {
    options: SmbFileSystemOptions,
    cache: ShareHandleCache,
}

impl SmbFileSystem {
    pub fn new(transport: Arc<dyn SmbTransport>, options: SmbFileSystemOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            cache: ShareHandleCache::new(transport),
        })
    }

    pub fn config(&self) -> &SmbVfsConfig {
        &self.options.config
    }

    /// Create the (unattached) file object for `name`
    pub fn resolve_file(self: &Arc<Self>, name: SmbFileName) -> SmbFileObject {
        SmbFileObject::new(Arc::clone(self), name)
    }

    /// Parse `uri` and create its file object
    pub fn resolve_uri(self: &Arc<Self>, uri: &str) -> VfsResult<SmbFileObject> {
        Ok(self.resolve_file(SmbFileName::parse(uri)?))
    }

    /// Lease a share handle for a resolved name
    pub(crate) async fn acquire(&self, resolved: &ResolvedName) -> VfsResult<ShareLease> {
        let auth = resolve_credentials(
            self.options.authenticator.as_deref(),
            &resolved.credentials,
            &self.options.config,
        );
        self.cache.acquire(&resolved.target, &auth).await
    }

    pub(crate) async fn release(&self, lease: ShareLease) -> VfsResult<()> {
        self.cache.release(lease).await
    }

    /// Number of share handles currently established
    pub async fn open_share_handles(&self) -> usize {
        self.cache.len().await
    }

    /// Tear down every remaining share handle
    pub async fn close(&self) -> VfsResult<()> {
        tracing::debug!("Closing SMB file system");
        self.cache.close_all().await
    }
}
