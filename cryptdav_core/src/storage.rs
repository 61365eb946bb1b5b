use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// How a file should be opened. Mirrors `std::fs::OpenOptions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Whether the handle may modify the file.
    pub fn writes(&self) -> bool {
        self.write || self.append
    }

    /// Translates POSIX `open(2)` flags as sent by protocol servers.
    #[cfg(unix)]
    pub fn from_posix_flags(flags: i32) -> Self {
        let access = flags & libc::O_ACCMODE;
        let create = flags & libc::O_CREAT != 0;
        Self {
            read: access == libc::O_RDONLY || access == libc::O_RDWR,
            write: access == libc::O_WRONLY || access == libc::O_RDWR,
            append: flags & libc::O_APPEND != 0,
            create,
            create_new: create && flags & libc::O_EXCL != 0,
            truncate: flags & libc::O_TRUNC != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata as seen through the storage engine: sizes are plaintext sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Final path component (empty for a filesystem root).
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
    /// Permission bits (e.g. `0o644`).
    pub mode: u32,
    pub modified: SystemTime,
}

impl FileMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// An open file or directory handed out by [`EncryptedStorage::open_file`].
#[async_trait]
pub trait StorageFile: std::fmt::Debug + Send + Sync {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Lists a directory handle, sorted by name.
    async fn read_dir(&mut self) -> io::Result<Vec<FileMetadata>>;

    async fn stat(&self) -> io::Result<FileMetadata>;

    /// Encrypts and persists pending writes.
    async fn flush(&mut self) -> io::Result<()>;

    /// Flushes and releases the handle. Further calls fail.
    async fn close(&mut self) -> io::Result<()>;

    async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        let mut chunk = [0u8; 8192];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    async fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

/// The capability an encrypted storage engine offers.
///
/// Paths are backing-store paths; callers are expected to have confined them
/// already. Errors are plain `io::Error`s so that a protocol server can map
/// them the same way it maps errors from a real filesystem.
#[async_trait]
pub trait EncryptedStorage: std::fmt::Debug + Send + Sync + 'static {
    async fn mkdir(&self, ctx: &CancellationToken, path: &Path, mode: u32) -> io::Result<()>;

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        path: &Path,
        options: OpenOptions,
        mode: u32,
    ) -> io::Result<Box<dyn StorageFile>>;

    /// Removes `path` and everything below it. A missing path is not an error.
    async fn remove_all(&self, ctx: &CancellationToken, path: &Path) -> io::Result<()>;

    async fn rename(
        &self,
        ctx: &CancellationToken,
        old_path: &Path,
        new_path: &Path,
    ) -> io::Result<()>;

    async fn stat(&self, ctx: &CancellationToken, path: &Path) -> io::Result<FileMetadata>;
}

/// Fails with `Interrupted` once the request has been cancelled.
pub fn check_cancelled(ctx: &CancellationToken) -> io::Result<()> {
    if ctx.is_cancelled() {
        return Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "request cancelled",
        ));
    }
    Ok(())
}

/// Final component of `path` as a lossy string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
