//! Behaviour of file objects against an in-memory share

use orbit_smb_vfs::protocols::smb::{FileAttributes, MemoryTransport};
use orbit_smb_vfs::vfs::{FileType, RandomAccessMode, SmbFileName, SmbFileSystem, SmbFileSystemOptions};
use orbit_smb_vfs::VfsError;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const HOST: &str = "fileserver";
const SHARE: &str = "projects";

fn uri(path: &str) -> String {
    format!("smb://{}/{}/{}", HOST, SHARE, path)
}

fn create_test_fs() -> (MemoryTransport, Arc<SmbFileSystem>) {
    orbit_smb_vfs::logging::init_test_logging();

    let transport = MemoryTransport::new();
    transport.add_host(HOST);
    transport.add_share(HOST, SHARE);
    transport.add_file(HOST, SHARE, "docs/a.txt", b"alpha");
    transport.add_file(HOST, SHARE, "docs/b.txt", b"bravo");
    let fs = SmbFileSystem::new(Arc::new(transport.clone()), SmbFileSystemOptions::default());
    (transport, fs)
}

async fn read_all(fs: &Arc<SmbFileSystem>, path: &str) -> Vec<u8> {
    let mut file = fs.resolve_uri(&uri(path)).unwrap();
    let mut input = file.get_input_stream().await.unwrap();
    let mut data = Vec::new();
    input.read_to_end(&mut data).await.unwrap();
    input.close().await.unwrap();
    file.detach().await.unwrap();
    data
}

async fn write_all(fs: &Arc<SmbFileSystem>, path: &str, data: &[u8], append: bool) {
    let mut file = fs.resolve_uri(&uri(path)).unwrap();
    let mut output = file.get_output_stream(append).await.unwrap();
    output.write_all(data).await.unwrap();
    output.shutdown().await.unwrap();
    file.detach().await.unwrap();
}

#[tokio::test]
async fn test_missing_path_is_imaginary_and_not_a_directory() {
    let (transport, fs) = create_test_fs();
    let mut missing = fs.resolve_uri(&uri("docs/missing")).unwrap();

    assert_eq!(missing.get_type().await.unwrap(), FileType::Imaginary);
    let err = missing.list_children().await.unwrap_err();
    assert!(matches!(err, VfsError::NotADirectory { .. }), "got {:?}", err);

    missing.detach().await.unwrap();
    assert_eq!(transport.counts().live(), 0);
}

#[tokio::test]
async fn test_file_is_file_and_not_a_directory() {
    let (_transport, fs) = create_test_fs();
    let mut file = fs.resolve_uri(&uri("docs/a.txt")).unwrap();

    assert_eq!(file.get_type().await.unwrap(), FileType::File);
    let err = file.list_children().await.unwrap_err();
    assert!(matches!(err, VfsError::NotADirectory { .. }), "got {:?}", err);

    file.detach().await.unwrap();
}

#[tokio::test]
async fn test_list_children_excludes_pseudo_entries() {
    let (transport, fs) = create_test_fs();
    transport.add_dir(HOST, SHARE, "docs/sub");
    let mut dir = fs.resolve_uri(&uri("docs")).unwrap();

    assert_eq!(dir.get_type().await.unwrap(), FileType::Folder);
    let mut children = dir.list_children().await.unwrap();
    children.sort();
    assert_eq!(children, vec!["a.txt", "b.txt", "sub"]);

    dir.detach().await.unwrap();
}

#[tokio::test]
async fn test_empty_directory_lists_nothing() {
    let (transport, fs) = create_test_fs();
    transport.add_dir(HOST, SHARE, "empty");
    let mut dir = fs.resolve_uri(&uri("empty")).unwrap();

    assert!(dir.list_children().await.unwrap().is_empty());
    dir.detach().await.unwrap();
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let (_transport, fs) = create_test_fs();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let mut file = fs.resolve_uri(&uri("docs/new.bin")).unwrap();
    assert_eq!(file.get_type().await.unwrap(), FileType::Imaginary);

    let mut output = file.get_output_stream(false).await.unwrap();
    output.write_all(&payload).await.unwrap();
    output.shutdown().await.unwrap();

    assert_eq!(file.get_type().await.unwrap(), FileType::File);
    assert_eq!(file.get_content_size().await.unwrap(), payload.len() as u64);
    file.detach().await.unwrap();

    assert_eq!(read_all(&fs, "docs/new.bin").await, payload);
}

#[tokio::test]
async fn test_output_stream_truncates_or_appends() {
    let (transport, fs) = create_test_fs();

    write_all(&fs, "docs/a.txt", b"-more", true).await;
    assert_eq!(
        transport.read_file(HOST, SHARE, "docs/a.txt"),
        Some(b"alpha-more".to_vec())
    );

    write_all(&fs, "docs/a.txt", b"x", false).await;
    assert_eq!(read_all(&fs, "docs/a.txt").await, b"x");
}

#[tokio::test]
async fn test_output_stream_in_missing_folder_is_not_found() {
    let (_transport, fs) = create_test_fs();
    let mut file = fs.resolve_uri(&uri("nowhere/new.txt")).unwrap();

    let err = file.get_output_stream(false).await.unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);
    file.detach().await.unwrap();
}

#[tokio::test]
async fn test_create_folder_is_idempotent() {
    let (transport, fs) = create_test_fs();
    let mut dir = fs.resolve_uri(&uri("docs")).unwrap();

    dir.create_folder().await.unwrap();
    dir.create_folder().await.unwrap();
    let mut children = dir.list_children().await.unwrap();
    children.sort();
    assert_eq!(children, vec!["a.txt", "b.txt"]);
    dir.detach().await.unwrap();

    let mut nested = fs.resolve_uri(&uri("new/deeper/leaf")).unwrap();
    nested.create_folder().await.unwrap();
    nested.create_folder().await.unwrap();
    assert_eq!(nested.get_type().await.unwrap(), FileType::Folder);
    nested.detach().await.unwrap();
    assert!(transport.exists(HOST, SHARE, "new/deeper"));
}

#[tokio::test]
async fn test_create_folder_over_file_already_exists() {
    let (_transport, fs) = create_test_fs();
    let mut file = fs.resolve_uri(&uri("docs/a.txt")).unwrap();

    let err = file.create_folder().await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists { .. }), "got {:?}", err);
    file.detach().await.unwrap();
}

#[tokio::test]
async fn test_rename_moves_file() {
    let (transport, fs) = create_test_fs();
    let mut source = fs.resolve_uri(&uri("docs/a.txt")).unwrap();
    let target = SmbFileName::parse(&uri("docs/renamed.txt")).unwrap();

    source.rename(&target).await.unwrap();
    assert_eq!(source.get_type().await.unwrap(), FileType::Imaginary);
    source.detach().await.unwrap();

    let mut moved = fs.resolve_file(target);
    assert_eq!(moved.get_type().await.unwrap(), FileType::File);
    moved.detach().await.unwrap();

    assert_eq!(read_all(&fs, "docs/renamed.txt").await, b"alpha");
    assert!(!transport.exists(HOST, SHARE, "docs/a.txt"));
}

#[tokio::test]
async fn test_rename_folder_moves_children() {
    let (transport, fs) = create_test_fs();
    let mut source = fs.resolve_uri(&uri("docs")).unwrap();

    source
        .rename(&SmbFileName::parse(&uri("archive")).unwrap())
        .await
        .unwrap();
    source.detach().await.unwrap();

    assert_eq!(
        transport.read_file(HOST, SHARE, "archive/b.txt"),
        Some(b"bravo".to_vec())
    );
}

#[tokio::test]
async fn test_rename_rejections() {
    let (transport, fs) = create_test_fs();
    transport.add_share(HOST, "other");
    let mut source = fs.resolve_uri(&uri("docs/a.txt")).unwrap();

    let other_share = SmbFileName::parse(&format!("smb://{}/other/a.txt", HOST)).unwrap();
    let err = source.rename(&other_share).await.unwrap_err();
    assert!(matches!(err, VfsError::PathResolution { .. }), "got {:?}", err);

    let occupied = SmbFileName::parse(&uri("docs/b.txt")).unwrap();
    let err = source.rename(&occupied).await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists { .. }), "got {:?}", err);

    let mut missing = fs.resolve_uri(&uri("docs/none.txt")).unwrap();
    let err = missing
        .rename(&SmbFileName::parse(&uri("docs/c.txt")).unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    source.detach().await.unwrap();
    missing.detach().await.unwrap();
    assert_eq!(read_all(&fs, "docs/a.txt").await, b"alpha");
}

#[tokio::test]
async fn test_delete_file_and_folder() {
    let (transport, fs) = create_test_fs();

    let mut file = fs.resolve_uri(&uri("docs/a.txt")).unwrap();
    file.delete().await.unwrap();
    assert_eq!(file.get_type().await.unwrap(), FileType::Imaginary);
    assert!(file.delete().await.unwrap_err().is_not_found());
    file.detach().await.unwrap();

    let mut dir = fs.resolve_uri(&uri("docs")).unwrap();
    assert!(dir.delete().await.is_err());
    transport.add_dir(HOST, SHARE, "gone");
    let mut empty = fs.resolve_uri(&uri("gone")).unwrap();
    empty.delete().await.unwrap();
    assert!(!transport.exists(HOST, SHARE, "gone"));

    dir.detach().await.unwrap();
    empty.detach().await.unwrap();
    assert_eq!(transport.counts().live(), 0);
}

#[tokio::test]
async fn test_delete_read_only_file_is_permission_error() {
    let (transport, fs) = create_test_fs();
    transport.set_attributes(HOST, SHARE, "docs/a.txt", FileAttributes::READONLY);
    let mut file = fs.resolve_uri(&uri("docs/a.txt")).unwrap();

    let err = file.delete().await.unwrap_err();
    assert!(err.is_permission_error(), "got {:?}", err);
    file.detach().await.unwrap();
}

#[tokio::test]
async fn test_metadata_is_real() {
    let (transport, fs) = create_test_fs();
    transport.set_attributes(HOST, SHARE, "docs/b.txt", FileAttributes::HIDDEN);

    let mut a = fs.resolve_uri(&uri("docs/a.txt")).unwrap();
    assert_eq!(a.get_content_size().await.unwrap(), 5);
    assert!(!a.is_hidden().await.unwrap());

    let stamp = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    a.set_last_modified_time(stamp).await.unwrap();
    assert_eq!(a.get_last_modified_time().await.unwrap(), stamp);
    a.detach().await.unwrap();

    let mut b = fs.resolve_uri(&uri("docs/b.txt")).unwrap();
    assert!(b.is_hidden().await.unwrap());
    b.detach().await.unwrap();

    let mut missing = fs.resolve_uri(&uri("docs/none")).unwrap();
    assert!(!missing.is_hidden().await.unwrap());
    assert!(missing.get_content_size().await.unwrap_err().is_not_found());
    assert!(missing
        .set_last_modified_time(SystemTime::now())
        .await
        .unwrap_err()
        .is_not_found());
    missing.detach().await.unwrap();
}

#[tokio::test]
async fn test_random_access_content() {
    let (transport, fs) = create_test_fs();

    let mut file = fs.resolve_uri(&uri("docs/a.txt")).unwrap();
    let mut content = file
        .get_random_access_content(RandomAccessMode::Read)
        .await
        .unwrap();
    assert_eq!(content.length().await.unwrap(), 5);
    content.seek(SeekFrom::Start(2)).await.unwrap();
    let mut rest = String::new();
    content.read_to_string(&mut rest).await.unwrap();
    assert_eq!(rest, "pha");
    assert!(content.write_all(b"x").await.is_err());
    content.close().await.unwrap();
    file.detach().await.unwrap();

    let mut created = fs.resolve_uri(&uri("docs/rw.bin")).unwrap();
    let err = created
        .get_random_access_content(RandomAccessMode::Read)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mut content = created
        .get_random_access_content(RandomAccessMode::ReadWrite)
        .await
        .unwrap();
    content.write_all(b"hello").await.unwrap();
    content.seek(SeekFrom::Start(0)).await.unwrap();
    content.write_all(b"J").await.unwrap();
    content.close().await.unwrap();
    created.detach().await.unwrap();

    assert_eq!(
        transport.read_file(HOST, SHARE, "docs/rw.bin"),
        Some(b"Jello".to_vec())
    );
    assert_eq!(transport.counts().live(), 0);
}
