//! Byte streams bound to an open remote file
//!
//! Each stream owns its file handle and closes it on `close` (or
//! `shutdown` for output streams). Reads are issued in chunks of the
//! configured I/O size; surplus bytes are kept for the next read.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use super::RandomAccessMode;
use crate::protocols::smb::{self, FileInformation, RemoteFile};

/// Remote operation in flight
enum Pending {
    Idle,
    Read(BoxFuture<'static, smb::Result<Bytes>>),
    /// Carries the length of the chunk handed to the server
    Write(BoxFuture<'static, smb::Result<usize>>, usize),
    Length(BoxFuture<'static, smb::Result<FileInformation>>),
    Close(BoxFuture<'static, smb::Result<()>>),
}

fn busy() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "another operation is in progress on this stream",
    )
}

/// Position-tracking state machine shared by all stream kinds
struct RemoteCursor {
    file: Arc<dyn RemoteFile>,
    position: u64,
    chunk_size: usize,
    /// Bytes already fetched, starting at `position`
    read_ahead: Bytes,
    pending: Pending,
    seek_target: Option<SeekFrom>,
    deferred_error: Option<io::Error>,
    closed: bool,
}

impl RemoteCursor {
    fn new(file: Arc<dyn RemoteFile>, position: u64, chunk_size: usize) -> Self {
        Self {
            file,
            position,
            chunk_size: chunk_size.max(1),
            read_ahead: Bytes::new(),
            pending: Pending::Idle,
            seek_target: None,
            deferred_error: None,
            closed: false,
        }
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "stream is closed"));
        }
        Ok(())
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.check_open()?;
        loop {
            if !self.read_ahead.is_empty() {
                let n = buf.remaining().min(self.read_ahead.len());
                buf.put_slice(&self.read_ahead.split_to(n));
                self.position += n as u64;
                return Poll::Ready(Ok(()));
            }

            match &mut self.pending {
                Pending::Idle => {
                    let file = Arc::clone(&self.file);
                    let (offset, len) = (self.position, self.chunk_size);
                    self.pending =
                        Pending::Read(Box::pin(async move { file.read_at(offset, len).await }));
                }
                Pending::Read(fut) => {
                    let result = ready!(fut.as_mut().poll(cx));
                    self.pending = Pending::Idle;
                    let data = result.map_err(io::Error::from)?;
                    if data.is_empty() {
                        // End of file
                        return Poll::Ready(Ok(()));
                    }
                    self.read_ahead = data;
                }
                _ => return Poll::Ready(Err(busy())),
            }
        }
    }

    /// A write that returned `Pending` must be retried with a buffer that
    /// still starts with the bytes already handed to the server.
    fn poll_write(&mut self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        self.check_open()?;
        loop {
            match &mut self.pending {
                Pending::Idle => {
                    if data.is_empty() {
                        return Poll::Ready(Ok(0));
                    }
                    self.read_ahead = Bytes::new();
                    let len = data.len().min(self.chunk_size);
                    let chunk = Bytes::copy_from_slice(&data[..len]);
                    let file = Arc::clone(&self.file);
                    let offset = self.position;
                    self.pending = Pending::Write(
                        Box::pin(async move { file.write_at(offset, chunk).await }),
                        len,
                    );
                }
                Pending::Write(fut, len) => {
                    if data.len() < *len {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "write retried with a shorter buffer than the chunk in flight",
                        )));
                    }
                    let result = ready!(fut.as_mut().poll(cx));
                    self.pending = Pending::Idle;
                    let written = result.map_err(io::Error::from)?;
                    self.position += written as u64;
                    return Poll::Ready(Ok(written));
                }
                _ => return Poll::Ready(Err(busy())),
            }
        }
    }

    /// Writes go straight to the server; flushing only completes one in flight
    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Pending::Write(fut, _) = &mut self.pending {
            let result = ready!(fut.as_mut().poll(cx));
            self.pending = Pending::Idle;
            self.position += result.map_err(io::Error::from)? as u64;
        }
        Poll::Ready(Ok(()))
    }

    /// Complete pending work and close the handle
    ///
    /// The handle is closed even when the last write failed; that failure is
    /// reported once the close finished.
    fn poll_close(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        if let Err(e) = ready!(self.poll_flush(cx)) {
            self.deferred_error = Some(e);
        }

        loop {
            match &mut self.pending {
                Pending::Idle => {
                    let file = Arc::clone(&self.file);
                    self.pending = Pending::Close(Box::pin(async move { file.close().await }));
                }
                Pending::Close(fut) => {
                    let result = ready!(fut.as_mut().poll(cx));
                    self.pending = Pending::Idle;
                    self.closed = true;
                    self.read_ahead = Bytes::new();
                    tracing::debug!("Closed stream on {}", self.file.path());
                    return Poll::Ready(match self.deferred_error.take() {
                        Some(e) => Err(e),
                        None => result.map_err(io::Error::from),
                    });
                }
                // An abandoned read or length query
                _ => self.pending = Pending::Idle,
            }
        }
    }

    fn start_seek(&mut self, target: SeekFrom) -> io::Result<()> {
        self.check_open()?;
        if !matches!(self.pending, Pending::Idle) || self.seek_target.is_some() {
            return Err(busy());
        }
        self.seek_target = Some(target);
        Ok(())
    }

    fn poll_seek_complete(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        if let Err(e) = ready!(self.poll_flush(cx)) {
            self.seek_target = None;
            return Poll::Ready(Err(e));
        }
        let Some(target) = self.seek_target else {
            return Poll::Ready(Ok(self.position));
        };

        let new_position = match target {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => loop {
                match &mut self.pending {
                    Pending::Idle => {
                        let file = Arc::clone(&self.file);
                        self.pending =
                            Pending::Length(Box::pin(async move { file.query_info().await }));
                    }
                    Pending::Length(fut) => {
                        let result = ready!(fut.as_mut().poll(cx));
                        self.pending = Pending::Idle;
                        match result {
                            Ok(info) => break info.end_of_file.checked_add_signed(delta),
                            Err(e) => {
                                self.seek_target = None;
                                return Poll::Ready(Err(e.into()));
                            }
                        }
                    }
                    _ => return Poll::Ready(Err(busy())),
                }
            },
        };
        self.seek_target = None;

        match new_position {
            Some(position) => {
                if position != self.position {
                    self.read_ahead = Bytes::new();
                    self.position = position;
                }
                Poll::Ready(Ok(position))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            ))),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        futures::future::poll_fn(|cx| self.poll_close(cx)).await
    }
}

impl fmt::Debug for RemoteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCursor")
            .field("path", &self.file.path())
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for RemoteCursor {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("Stream on {} dropped without close", self.file.path());
        }
    }
}

/// Sequential reader over a remote file
#[derive(Debug)]
pub struct SmbInputStream {
    cursor: RemoteCursor,
}

impl SmbInputStream {
    pub(crate) fn new(file: Arc<dyn RemoteFile>, chunk_size: usize) -> Self {
        Self {
            cursor: RemoteCursor::new(file, 0, chunk_size),
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.cursor.position
    }

    /// Close the remote handle
    pub async fn close(&mut self) -> io::Result<()> {
        self.cursor.close().await
    }
}

impl AsyncRead for SmbInputStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_read(cx, buf)
    }
}

/// Sequential writer over a remote file
///
/// `shutdown` closes the remote handle.
#[derive(Debug)]
pub struct SmbOutputStream {
    cursor: RemoteCursor,
}

impl SmbOutputStream {
    pub(crate) fn new(file: Arc<dyn RemoteFile>, position: u64, chunk_size: usize) -> Self {
        Self {
            cursor: RemoteCursor::new(file, position, chunk_size),
        }
    }

    /// Offset the next write lands at
    pub fn position(&self) -> u64 {
        self.cursor.position
    }
}

impl AsyncWrite for SmbOutputStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().cursor.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_close(cx)
    }
}

/// Seekable view of a remote file
#[derive(Debug)]
pub struct SmbRandomAccessContent {
    cursor: RemoteCursor,
    mode: RandomAccessMode,
}

impl SmbRandomAccessContent {
    pub(crate) fn new(file: Arc<dyn RemoteFile>, mode: RandomAccessMode, chunk_size: usize) -> Self {
        Self {
            cursor: RemoteCursor::new(file, 0, chunk_size),
            mode,
        }
    }

    pub fn mode(&self) -> RandomAccessMode {
        self.mode
    }

    /// Current offset
    pub fn position(&self) -> u64 {
        self.cursor.position
    }

    /// Current size of the remote file
    pub async fn length(&self) -> io::Result<u64> {
        self.cursor.check_open()?;
        let info = self.cursor.file.query_info().await?;
        Ok(info.end_of_file)
    }

    /// Close the remote handle
    pub async fn close(&mut self) -> io::Result<()> {
        self.cursor.close().await
    }
}

impl AsyncRead for SmbRandomAccessContent {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_read(cx, buf)
    }
}

impl AsyncWrite for SmbRandomAccessContent {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.mode.can_write() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "random access content opened read-only",
            )));
        }
        this.cursor.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().cursor.poll_close(cx)
    }
}

impl AsyncSeek for SmbRandomAccessContent {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        self.get_mut().cursor.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        self.get_mut().cursor.poll_seek_complete(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::smb::{
        AccessMask, AuthenticationContext, CreateDisposition, DiskShare, MemoryTransport,
        OpenArgs, ShareTarget,
    };
    use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

    const CHUNK: usize = 4;

    async fn open(
        transport: &MemoryTransport,
        access: AccessMask,
        disposition: CreateDisposition,
    ) -> Arc<dyn RemoteFile> {
        let handle = smb::establish(
            transport,
            &ShareTarget::new("server", 445, "data"),
            &AuthenticationContext::anonymous(),
        )
        .await
        .unwrap();
        let share: Arc<dyn DiskShare> = Arc::clone(handle.share());
        share
            .open_file("f.bin", &OpenArgs::new(access, disposition).file())
            .await
            .unwrap()
    }

    fn create_test_transport() -> MemoryTransport {
        let transport = MemoryTransport::new();
        transport.add_host("server");
        transport.add_share("server", "data");
        transport.add_file("server", "data", "f.bin", b"0123456789");
        transport
    }

    #[tokio::test]
    async fn test_input_stream_reads_in_chunks() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_READ_DATA, CreateDisposition::Open).await;

        let mut input = SmbInputStream::new(file, CHUNK);
        let mut first = [0u8; 3];
        input.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"012");

        let mut rest = Vec::new();
        input.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"3456789");
        assert_eq!(input.position(), 10);

        input.close().await.unwrap();
        assert!(input.read_to_end(&mut rest).await.is_err());
    }

    #[tokio::test]
    async fn test_output_stream_writes_and_closes_handle() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_WRITE_DATA, CreateDisposition::Overwrite).await;
        let handles_before = transport.counts().handles;

        let mut output = SmbOutputStream::new(file, 0, CHUNK);
        output.write_all(b"hello world").await.unwrap();
        output.shutdown().await.unwrap();

        assert_eq!(transport.counts().handles, handles_before - 1);
        assert_eq!(
            transport.read_file("server", "data", "f.bin"),
            Some(b"hello world".to_vec())
        );
    }

    #[tokio::test]
    async fn test_random_access_seek_and_overwrite() {
        let transport = create_test_transport();
        let access = AccessMask::FILE_READ_DATA
            | AccessMask::FILE_WRITE_DATA
            | AccessMask::FILE_READ_ATTRIBUTES;
        let file = open(&transport, access, CreateDisposition::OpenIf).await;

        let mut content = SmbRandomAccessContent::new(file, RandomAccessMode::ReadWrite, CHUNK);
        assert_eq!(content.length().await.unwrap(), 10);

        assert_eq!(content.seek(SeekFrom::End(-2)).await.unwrap(), 8);
        let mut tail = String::new();
        content.read_to_string(&mut tail).await.unwrap();
        assert_eq!(tail, "89");

        content.seek(SeekFrom::Start(2)).await.unwrap();
        content.write_all(b"AB").await.unwrap();
        assert_eq!(content.seek(SeekFrom::Current(0)).await.unwrap(), 4);
        assert!(content.seek(SeekFrom::Current(-10)).await.is_err());

        content.close().await.unwrap();
        assert_eq!(
            transport.read_file("server", "data", "f.bin"),
            Some(b"01AB456789".to_vec())
        );
    }

    #[tokio::test]
    async fn test_read_only_random_access_rejects_writes() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_READ_DATA, CreateDisposition::Open).await;

        let mut content = SmbRandomAccessContent::new(file, RandomAccessMode::Read, CHUNK);
        let err = content.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        content.close().await.unwrap();
    }

    fn failing_write() -> Pending {
        Pending::Write(
            Box::pin(async { Err(smb::SmbError::Permission("f.bin".to_string())) }),
            4,
        )
    }

    #[tokio::test]
    async fn test_failed_flush_does_not_wedge_seek() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_READ_DATA, CreateDisposition::Open).await;
        let mut content = SmbRandomAccessContent::new(file, RandomAccessMode::ReadWrite, CHUNK);

        content.cursor.seek_target = Some(SeekFrom::Start(3));
        content.cursor.pending = failing_write();
        let err = futures::future::poll_fn(|cx| content.cursor.poll_seek_complete(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        assert_eq!(content.seek(SeekFrom::Start(3)).await.unwrap(), 3);
        let mut rest = String::new();
        content.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "3456789");
        content.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_retry_with_shorter_buffer_is_rejected() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_WRITE_DATA, CreateDisposition::Open).await;
        let mut output = SmbOutputStream::new(file, 0, CHUNK);

        output.cursor.pending = failing_write();
        let err = futures::future::poll_fn(|cx| output.cursor.poll_write(cx, b"ab"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        output.cursor.pending = Pending::Idle;
        output.shutdown().await.unwrap();
        assert_eq!(
            transport.read_file("server", "data", "f.bin"),
            Some(b"0123456789".to_vec())
        );
    }

    #[tokio::test]
    async fn test_streams_debug_shows_path_and_position() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_READ_DATA, CreateDisposition::Open).await;
        let mut input = SmbInputStream::new(file, CHUNK);
        let mut two = [0u8; 2];
        input.read_exact(&mut two).await.unwrap();

        let debug = format!("{:?}", input);
        assert!(debug.contains("f.bin"));
        assert!(debug.contains("position: 2"));
        input.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_without_access_is_permission_denied() {
        let transport = create_test_transport();
        let file = open(&transport, AccessMask::FILE_READ_DATA, CreateDisposition::Open).await;
        assert_eq!(file.path(), "f.bin");

        let mut output = SmbOutputStream::new(file, 0, CHUNK);
        let err = output.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        output.shutdown().await.unwrap();
    }
}
