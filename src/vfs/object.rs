//! Remote object adapter
//!
//! [`SmbFileObject`] is the per-name adapter a file framework drives. It is
//! either unattached, or attached with a share lease, the kind found by the
//! last existence check, and at most one open reference to the remote object.
//!
//! Nothing is created on attach: a missing object is reported as
//! [`FileType::Imaginary`] until an operation with write intent creates it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

use super::filesystem::SmbFileSystem;
use super::name::{ResolvedName, SmbFileName};
use super::pool::ShareLease;
use super::stream::{SmbInputStream, SmbOutputStream, SmbRandomAccessContent};
use super::{FileObjectOps, FileType, RandomAccessMode};
use crate::error::{VfsError, VfsResult};
use crate::protocols::smb::{
    self, AccessMask, CreateDisposition, DiskShare, FileBasicInformation, FileInformation,
    OpenArgs, RemoteDirectory, RemoteFile, RemoteHandle, SmbError,
};

/// Kind of the remote object as of the last existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    File,
    Directory,
    Imaginary,
}

impl From<ObjectKind> for FileType {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::File => FileType::File,
            ObjectKind::Directory => FileType::Folder,
            ObjectKind::Imaginary => FileType::Imaginary,
        }
    }
}

/// Open reference to the remote object
#[derive(Clone)]
enum RemoteObject {
    File(Arc<dyn RemoteFile>),
    Directory(Arc<dyn RemoteDirectory>),
}

impl RemoteObject {
    fn kind(&self) -> ObjectKind {
        match self {
            RemoteObject::File(_) => ObjectKind::File,
            RemoteObject::Directory(_) => ObjectKind::Directory,
        }
    }

    async fn query_info(&self) -> smb::Result<FileInformation> {
        match self {
            RemoteObject::File(file) => file.query_info().await,
            RemoteObject::Directory(dir) => dir.query_info().await,
        }
    }

    async fn set_basic_info(&self, info: &FileBasicInformation) -> smb::Result<()> {
        match self {
            RemoteObject::File(file) => file.set_basic_info(info).await,
            RemoteObject::Directory(dir) => dir.set_basic_info(info).await,
        }
    }

    async fn rename(&self, new_path: &str, replace_if_exists: bool) -> smb::Result<()> {
        match self {
            RemoteObject::File(file) => file.rename(new_path, replace_if_exists).await,
            RemoteObject::Directory(dir) => dir.rename(new_path, replace_if_exists).await,
        }
    }

    async fn close(&self) -> smb::Result<()> {
        match self {
            RemoteObject::File(file) => file.close().await,
            RemoteObject::Directory(dir) => dir.close().await,
        }
    }
}

/// Open a file or directory handle with `access`
async fn open_object(
    share: &dyn DiskShare,
    path: &str,
    kind: ObjectKind,
    access: AccessMask,
) -> smb::Result<RemoteObject> {
    let args = OpenArgs::open_existing(access);
    match kind {
        ObjectKind::Directory => share
            .open_directory(path, &args.directory())
            .await
            .map(RemoteObject::Directory),
        _ => share
            .open_file(path, &args.file())
            .await
            .map(RemoteObject::File),
    }
}

struct Attachment {
    lease: ShareLease,
    kind: ObjectKind,
    object: Option<RemoteObject>,
}

enum AttachState {
    Unattached,
    Attached(Attachment),
}

/// Adapter between one virtual file name and the remote share
pub struct SmbFileObject {
    fs: Arc<SmbFileSystem>,
    name: SmbFileName,
    resolved: Option<ResolvedName>,
    state: AttachState,
}

impl std::fmt::Debug for SmbFileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbFileObject")
            .field("name", &self.name)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Access of the attribute-level reference held while attached
fn reference_access(kind: ObjectKind) -> AccessMask {
    match kind {
        ObjectKind::Directory => AccessMask::FILE_READ_DATA | AccessMask::FILE_READ_ATTRIBUTES,
        _ => AccessMask::FILE_READ_ATTRIBUTES,
    }
}

/// Ask both existence questions; the share root is always a directory
async fn detect_kind(share: &dyn DiskShare, path: &str, shown: &str) -> VfsResult<ObjectKind> {
    if path.is_empty() {
        return Ok(ObjectKind::Directory);
    }

    let is_file = share
        .file_exists(path)
        .await
        .map_err(|e| VfsError::from_smb(e, shown))?;
    let is_dir = share
        .folder_exists(path)
        .await
        .map_err(|e| VfsError::from_smb(e, shown))?;

    match (is_file, is_dir) {
        (true, true) => Err(VfsError::TypeConflict {
            path: shown.to_string(),
        }),
        (true, false) => Ok(ObjectKind::File),
        (false, true) => Ok(ObjectKind::Directory),
        (false, false) => Ok(ObjectKind::Imaginary),
    }
}

/// Open the attribute-level reference for an existing object
///
/// An object that vanished since the check yields `None`.
async fn open_reference(
    share: &dyn DiskShare,
    path: &str,
    kind: ObjectKind,
    shown: &str,
) -> VfsResult<Option<RemoteObject>> {
    if kind == ObjectKind::Imaginary {
        return Ok(None);
    }
    let opened = open_object(share, path, kind, reference_access(kind)).await;
    match opened {
        Ok(object) => Ok(Some(object)),
        Err(SmbError::NotFound(_)) => Ok(None),
        Err(e) => Err(VfsError::from_smb(e, shown)),
    }
}

/// Close a handle, mapping the failure to `shown`
async fn close_handle<H: RemoteHandle + ?Sized>(handle: &H, shown: &str) -> VfsResult<()> {
    handle
        .close()
        .await
        .map_err(|e| VfsError::from_smb(e, shown))
}

impl SmbFileObject {
    pub(crate) fn new(fs: Arc<SmbFileSystem>, name: SmbFileName) -> Self {
        Self {
            fs,
            name,
            resolved: None,
            state: AttachState::Unattached,
        }
    }

    pub fn name(&self) -> &SmbFileName {
        &self.name
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, AttachState::Attached(_))
    }

    fn display(&self) -> String {
        self.name.to_uri()
    }

    /// Resolve the name once; the result never changes afterwards
    fn resolved(&mut self) -> VfsResult<&ResolvedName> {
        if self.resolved.is_none() {
            let resolved = self.name.resolve(self.fs.config().default_port)?;
            self.resolved = Some(resolved);
        }
        self.resolved
            .as_ref()
            .ok_or_else(|| VfsError::path_resolution(self.name.to_uri(), "name not resolved"))
    }

    fn remote_path(&mut self) -> VfsResult<String> {
        Ok(self.resolved()?.path.clone())
    }

    /// Attach if needed; returns whether this call did the attaching
    async fn ensure_attached(&mut self) -> VfsResult<bool> {
        if self.is_attached() {
            return Ok(false);
        }

        let resolved = self.resolved()?.clone();
        let shown = self.display();
        let lease = self.fs.acquire(&resolved).await?;
        let share = Arc::clone(lease.share());

        let detected = match detect_kind(share.as_ref(), &resolved.path, &shown).await {
            Ok(kind) => open_reference(share.as_ref(), &resolved.path, kind, &shown)
                .await
                .map(|object| (kind, object)),
            Err(e) => Err(e),
        };

        match detected {
            Ok((kind, object)) => {
                let kind = if object.is_none() {
                    ObjectKind::Imaginary
                } else {
                    kind
                };
                tracing::debug!("Attached {} as {:?}", shown, kind);
                self.state = AttachState::Attached(Attachment {
                    lease,
                    kind,
                    object,
                });
                Ok(true)
            }
            Err(e) => {
                if let Err(release) = self.fs.release(lease).await {
                    tracing::warn!("Failed to release share lease for {}: {}", shown, release);
                }
                Err(e)
            }
        }
    }

    async fn attachment(&mut self) -> VfsResult<&mut Attachment> {
        self.ensure_attached().await?;
        match &mut self.state {
            AttachState::Attached(attachment) => Ok(attachment),
            AttachState::Unattached => Err(VfsError::Protocol {
                path: self.name.to_uri(),
                message: "object is not attached".to_string(),
            }),
        }
    }

    async fn share(&mut self) -> VfsResult<Arc<dyn DiskShare>> {
        Ok(Arc::clone(self.attachment().await?.lease.share()))
    }

    /// Check the remote path again, dropping a reference of the wrong kind
    async fn refresh(&mut self) -> VfsResult<ObjectKind> {
        let path = self.remote_path()?;
        let shown = self.display();
        let attachment = self.attachment().await?;
        let share = Arc::clone(attachment.lease.share());

        let kind = detect_kind(share.as_ref(), &path, &shown).await?;
        if attachment.object.as_ref().is_some_and(|o| o.kind() != kind) {
            if let Some(stale) = attachment.object.take() {
                if let Err(e) = stale.close().await {
                    tracing::warn!("Failed to close stale reference on {}: {}", shown, e);
                }
            }
        }
        attachment.kind = kind;
        Ok(kind)
    }

    /// Current kind, probing unless attach just did
    async fn current_kind(&mut self) -> VfsResult<ObjectKind> {
        if self.ensure_attached().await? {
            Ok(self.attachment().await?.kind)
        } else {
            self.refresh().await
        }
    }

    /// Held reference, opened on demand; `None` when nothing exists
    async fn reference(&mut self) -> VfsResult<Option<RemoteObject>> {
        if let Some(object) = &self.attachment().await?.object {
            return Ok(Some(object.clone()));
        }

        let kind = self.refresh().await?;
        let path = self.remote_path()?;
        let shown = self.display();
        let share = self.share().await?;
        let object = open_reference(share.as_ref(), &path, kind, &shown).await?;

        let attachment = self.attachment().await?;
        attachment.object = object.clone();
        if object.is_none() {
            attachment.kind = ObjectKind::Imaginary;
        }
        Ok(object)
    }

    /// Close the held reference before an operation that needs the path free
    async fn drop_reference(&mut self) -> VfsResult<()> {
        let shown = self.display();
        if let Some(object) = self.attachment().await?.object.take() {
            object
                .close()
                .await
                .map_err(|e| VfsError::from_smb(e, &shown))?;
        }
        Ok(())
    }

    async fn file_info(&mut self) -> VfsResult<FileInformation> {
        let shown = self.display();
        match self.reference().await? {
            Some(object) => object
                .query_info()
                .await
                .map_err(|e| VfsError::from_smb(e, &shown)),
            None => Err(VfsError::NotFound { path: shown }),
        }
    }

    async fn set_kind(&mut self, kind: ObjectKind) -> VfsResult<()> {
        self.attachment().await?.kind = kind;
        Ok(())
    }

    /// Establish the share handle and open a reference if the object exists
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn attach(&mut self) -> VfsResult<()> {
        self.ensure_attached().await.map(|_| ())
    }

    /// Close the held reference and release the share lease
    ///
    /// The object is unattached afterwards even when cleanup fails.
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn detach(&mut self) -> VfsResult<()> {
        let attachment = match std::mem::replace(&mut self.state, AttachState::Unattached) {
            AttachState::Attached(attachment) => attachment,
            AttachState::Unattached => return Ok(()),
        };
        let shown = self.display();

        let closed = match attachment.object {
            Some(object) => object
                .close()
                .await
                .map_err(|e| VfsError::from_smb(e, &shown)),
            None => Ok(()),
        };
        let released = self.fs.release(attachment.lease).await;

        closed.and(released)
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_type(&mut self) -> VfsResult<FileType> {
        Ok(self.current_kind().await?.into())
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn list_children(&mut self) -> VfsResult<Vec<String>> {
        if self.current_kind().await? != ObjectKind::Directory {
            return Err(VfsError::NotADirectory {
                path: self.display(),
            });
        }

        let shown = self.display();
        let entries = match self.reference().await? {
            Some(RemoteObject::Directory(dir)) => dir.list().await,
            _ => return Err(VfsError::NotADirectory { path: shown }),
        }
        .map_err(|e| VfsError::from_smb(e, &shown))?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_pseudo())
            .map(|entry| entry.file_name)
            .collect())
    }

    /// The HIDDEN attribute; `false` when nothing exists at the name
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn is_hidden(&mut self) -> VfsResult<bool> {
        match self.file_info().await {
            Ok(info) => Ok(info.is_hidden()),
            Err(VfsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove the file or empty directory at the name
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn delete(&mut self) -> VfsResult<()> {
        let kind = self.current_kind().await?;
        let path = self.remote_path()?;
        let shown = self.display();
        self.drop_reference().await?;

        let share = self.share().await?;
        let removed = match kind {
            ObjectKind::File => share.rm(&path).await,
            ObjectKind::Directory => share.rmdir(&path).await,
            ObjectKind::Imaginary => return Err(VfsError::NotFound { path: shown }),
        };
        removed.map_err(|e| VfsError::from_smb(e, &shown))?;

        tracing::info!("Deleted {}", shown);
        self.set_kind(ObjectKind::Imaginary).await
    }

    /// Move the remote object to `target` on the same share
    #[tracing::instrument(skip(self, target), fields(name = %self.name, target = %target))]
    pub async fn rename(&mut self, target: &SmbFileName) -> VfsResult<()> {
        let shown = self.display();
        let source = self.resolved()?.clone();
        let destination = target.resolve(self.fs.config().default_port)?;

        if !source.same_share(&destination) {
            return Err(VfsError::path_resolution(
                target.to_uri(),
                "rename target is on a different share",
            ));
        }
        if source.is_share_root() || destination.is_share_root() {
            return Err(VfsError::path_resolution(
                target.to_uri(),
                "the share root cannot be renamed",
            ));
        }

        let kind = self.current_kind().await?;
        self.drop_reference().await?;
        let share = self.share().await?;

        if kind == ObjectKind::Imaginary {
            return Err(VfsError::NotFound { path: shown });
        }
        let access = AccessMask::DELETE | AccessMask::FILE_READ_ATTRIBUTES;
        let object = open_object(share.as_ref(), &source.path, kind, access)
            .await
            .map_err(|e| VfsError::from_smb(e, &shown))?;

        let renamed = object
            .rename(&destination.path, false)
            .await
            .map_err(|e| VfsError::from_smb(e, &target.to_uri()));
        let closed = object
            .close()
            .await
            .map_err(|e| VfsError::from_smb(e, &shown));
        renamed.and(closed)?;

        tracing::info!("Renamed {} to {}", shown, target);
        self.set_kind(ObjectKind::Imaginary).await
    }

    /// Create the directory (and missing ancestors); existing directories are fine
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn create_folder(&mut self) -> VfsResult<()> {
        let shown = self.display();
        match self.current_kind().await? {
            ObjectKind::Directory => return Ok(()),
            ObjectKind::File => return Err(VfsError::AlreadyExists { path: shown }),
            ObjectKind::Imaginary => {}
        }

        let path = self.remote_path()?;
        let share = self.share().await?;
        let create = OpenArgs::new(
            AccessMask::FILE_READ_DATA | AccessMask::FILE_READ_ATTRIBUTES,
            CreateDisposition::OpenIf,
        )
        .directory();

        let segments: Vec<&str> = path.split('\\').collect();
        for depth in 1..segments.len() {
            let ancestor = segments[..depth].join("\\");
            if share
                .folder_exists(&ancestor)
                .await
                .map_err(|e| VfsError::from_smb(e, &shown))?
            {
                continue;
            }
            let dir = share
                .open_directory(&ancestor, &create)
                .await
                .map_err(|e| VfsError::from_smb(e, &shown))?;
            close_handle(dir.as_ref(), &shown).await?;
        }

        let dir = share
            .open_directory(&path, &create)
            .await
            .map_err(|e| match e {
                SmbError::NotADirectory(_) => VfsError::AlreadyExists {
                    path: shown.clone(),
                },
                other => VfsError::from_smb(other, &shown),
            })?;

        tracing::debug!("Created folder {}", shown);
        let attachment = self.attachment().await?;
        attachment.kind = ObjectKind::Directory;
        attachment.object = Some(RemoteObject::Directory(dir));
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_content_size(&mut self) -> VfsResult<u64> {
        let info = self.file_info().await?;
        if info.is_directory() {
            return Err(VfsError::NotAFile {
                path: self.display(),
            });
        }
        Ok(info.end_of_file)
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_last_modified_time(&mut self) -> VfsResult<SystemTime> {
        let shown = self.display();
        self.file_info()
            .await?
            .last_write_time
            .ok_or_else(|| VfsError::Protocol {
                path: shown,
                message: "server reported no last write time".to_string(),
            })
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn set_last_modified_time(&mut self, time: SystemTime) -> VfsResult<()> {
        let shown = self.display();
        let kind = match self.reference().await? {
            Some(object) => object.kind(),
            None => return Err(VfsError::NotFound { path: shown }),
        };
        let path = self.remote_path()?;
        let share = self.share().await?;

        let object = open_object(share.as_ref(), &path, kind, AccessMask::FILE_WRITE_ATTRIBUTES)
            .await
            .map_err(|e| VfsError::from_smb(e, &shown))?;

        let update = FileBasicInformation {
            last_write_time: Some(time),
            ..Default::default()
        };
        let updated = object
            .set_basic_info(&update)
            .await
            .map_err(|e| VfsError::from_smb(e, &shown));
        let closed = object
            .close()
            .await
            .map_err(|e| VfsError::from_smb(e, &shown));
        updated.and(closed)
    }

    /// Open a content handle on an existing file
    async fn open_content(&mut self, args: OpenArgs) -> VfsResult<Arc<dyn RemoteFile>> {
        let shown = self.display();
        let path = self.remote_path()?;
        let share = self.share().await?;
        share
            .open_file(&path, &args.file())
            .await
            .map_err(|e| VfsError::from_smb(e, &shown))
    }

    fn ensure_not_folder(&self, kind: ObjectKind) -> VfsResult<()> {
        if kind == ObjectKind::Directory {
            return Err(VfsError::NotAFile {
                path: self.display(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_input_stream(&mut self) -> VfsResult<SmbInputStream> {
        let kind = self.current_kind().await?;
        self.ensure_not_folder(kind)?;
        if kind == ObjectKind::Imaginary {
            return Err(VfsError::NotFound {
                path: self.display(),
            });
        }

        let access = AccessMask::FILE_READ_DATA | AccessMask::FILE_READ_ATTRIBUTES;
        let file = self.open_content(OpenArgs::open_existing(access)).await?;
        Ok(SmbInputStream::new(file, self.fs.config().chunk_size()))
    }

    /// Writer positioned at 0 (truncating) or, with `append`, at the end
    ///
    /// A missing file is created. Appending costs one extra size query.
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_output_stream(&mut self, append: bool) -> VfsResult<SmbOutputStream> {
        let kind = self.current_kind().await?;
        self.ensure_not_folder(kind)?;

        let disposition = match (kind, append) {
            (ObjectKind::Imaginary, _) => CreateDisposition::Create,
            (_, true) => CreateDisposition::Open,
            (_, false) => CreateDisposition::Overwrite,
        };
        let access = AccessMask::FILE_WRITE_DATA | AccessMask::FILE_READ_ATTRIBUTES;
        let file = self.open_content(OpenArgs::new(access, disposition)).await?;

        let position = if append && kind == ObjectKind::File {
            match file.query_info().await {
                Ok(info) => info.end_of_file,
                Err(e) => {
                    let shown = self.display();
                    close_handle(file.as_ref(), &shown).await?;
                    return Err(VfsError::from_smb(e, &shown));
                }
            }
        } else {
            0
        };

        self.set_kind(ObjectKind::File).await?;
        Ok(SmbOutputStream::new(file, position, self.fs.config().chunk_size()))
    }

    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn get_random_access_content(
        &mut self,
        mode: RandomAccessMode,
    ) -> VfsResult<SmbRandomAccessContent> {
        let kind = self.current_kind().await?;
        self.ensure_not_folder(kind)?;

        let args = match mode {
            RandomAccessMode::Read => {
                if kind == ObjectKind::Imaginary {
                    return Err(VfsError::NotFound {
                        path: self.display(),
                    });
                }
                OpenArgs::open_existing(
                    AccessMask::FILE_READ_DATA | AccessMask::FILE_READ_ATTRIBUTES,
                )
            }
            RandomAccessMode::ReadWrite => OpenArgs::new(
                AccessMask::FILE_READ_DATA
                    | AccessMask::FILE_WRITE_DATA
                    | AccessMask::FILE_READ_ATTRIBUTES,
                CreateDisposition::OpenIf,
            ),
        };
        let file = self.open_content(args).await?;

        self.set_kind(ObjectKind::File).await?;
        Ok(SmbRandomAccessContent::new(
            file,
            mode,
            self.fs.config().chunk_size(),
        ))
    }
}

impl Drop for SmbFileObject {
    fn drop(&mut self) {
        if self.is_attached() {
            tracing::warn!(
                "{} dropped while attached; its share lease is held until the file system closes",
                self.name
            );
        }
    }
}

#[async_trait]
impl FileObjectOps for SmbFileObject {
    type Name = SmbFileName;
    type InputStream = SmbInputStream;
    type OutputStream = SmbOutputStream;
    type RandomAccess = SmbRandomAccessContent;

    async fn attach(&mut self) -> VfsResult<()> {
        SmbFileObject::attach(self).await
    }

    async fn detach(&mut self) -> VfsResult<()> {
        SmbFileObject::detach(self).await
    }

    async fn get_type(&mut self) -> VfsResult<FileType> {
        SmbFileObject::get_type(self).await
    }

    async fn list_children(&mut self) -> VfsResult<Vec<String>> {
        SmbFileObject::list_children(self).await
    }

    async fn is_hidden(&mut self) -> VfsResult<bool> {
        SmbFileObject::is_hidden(self).await
    }

    async fn delete(&mut self) -> VfsResult<()> {
        SmbFileObject::delete(self).await
    }

    async fn rename(&mut self, target: &SmbFileName) -> VfsResult<()> {
        SmbFileObject::rename(self, target).await
    }

    async fn create_folder(&mut self) -> VfsResult<()> {
        SmbFileObject::create_folder(self).await
    }

    async fn get_content_size(&mut self) -> VfsResult<u64> {
        SmbFileObject::get_content_size(self).await
    }

    async fn get_last_modified_time(&mut self) -> VfsResult<SystemTime> {
        SmbFileObject::get_last_modified_time(self).await
    }

    async fn set_last_modified_time(&mut self, time: SystemTime) -> VfsResult<()> {
        SmbFileObject::set_last_modified_time(self, time).await
    }

    async fn get_input_stream(&mut self) -> VfsResult<SmbInputStream> {
        SmbFileObject::get_input_stream(self).await
    }

    async fn get_output_stream(&mut self, append: bool) -> VfsResult<SmbOutputStream> {
        SmbFileObject::get_output_stream(self, append).await
    }

    async fn get_random_access_content(
        &mut self,
        mode: RandomAccessMode,
    ) -> VfsResult<SmbRandomAccessContent> {
        SmbFileObject::get_random_access_content(self, mode).await
    }
}
