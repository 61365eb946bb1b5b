//! Encrypted storage engine backed by the local filesystem.
//!
//! Paths are host paths, already confined by the caller. Directory structure
//! and names are stored as-is; file bodies are sealed with the chunk format
//! from [`cryptdav_core::crypto`].

use async_trait::async_trait;
use cryptdav_core::crypto;
use cryptdav_core::storage::{check_cancelled, file_name};
use cryptdav_core::{
    CancellationToken, EncryptedStorage, FileKind, FileMetadata, MasterKey, OpenOptions,
    PlaintextBuffer, StorageFile,
};
use std::io::{self, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LocalEncryptedFs {
    key: MasterKey,
}

impl LocalEncryptedFs {
    pub fn new(key: MasterKey) -> Self {
        LocalEncryptedFs { key }
    }

    async fn create_empty(&self, path: &Path, mode: u32) -> io::Result<()> {
        let sealed = crypto::encrypt_file(&self.key, &[])?;
        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        opts.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        let mut file = opts.open(path).await?;
        file.write_all(&sealed).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn load(&self, path: &Path) -> io::Result<PlaintextBuffer> {
        let sealed = tokio::fs::read(path).await?;
        let plain = crypto::decrypt_file(&self.key, &sealed)?;
        Ok(PlaintextBuffer::new(plain))
    }
}

/// Seals `plaintext` and replaces the file at `path` atomically.
///
/// The sealed body goes to a randomly named sibling created with `O_EXCL`,
/// so no client-visible name is ever reused or clobbered.
async fn persist(key: &MasterKey, path: &Path, plaintext: &[u8]) -> io::Result<()> {
    let sealed = crypto::encrypt_file(key, plaintext)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&path, &sealed))
        .await
        .map_err(io::Error::other)?
}

fn replace_file(path: &Path, sealed: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path).ok().map(|m| m.permissions());

    // Removed on drop if anything below fails
    let mut tmp = tempfile::Builder::new()
        .prefix(".cryptdav-")
        .tempfile_in(dir)?;
    tmp.write_all(sealed)?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn to_metadata(path: &Path, meta: &std::fs::Metadata) -> FileMetadata {
    let kind = if meta.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    };
    let size = match kind {
        FileKind::Directory => 0,
        FileKind::File => crypto::plaintext_len(meta.len()),
    };
    FileMetadata {
        name: file_name(path),
        kind,
        size,
        mode: mode_bits(meta),
        modified: meta.modified().unwrap_or(UNIX_EPOCH),
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[async_trait]
impl EncryptedStorage for LocalEncryptedFs {
    async fn mkdir(&self, ctx: &CancellationToken, path: &Path, mode: u32) -> io::Result<()> {
        check_cancelled(ctx)?;
        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await
    }

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        path: &Path,
        options: OpenOptions,
        mode: u32,
    ) -> io::Result<Box<dyn StorageFile>> {
        check_cancelled(ctx)?;
        let state = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => {
                if options.create_new {
                    return Err(io::ErrorKind::AlreadyExists.into());
                }
                if options.writes() {
                    return Err(io::ErrorKind::IsADirectory.into());
                }
                HandleState::Directory
            }
            Ok(_) => {
                if options.create_new {
                    return Err(io::ErrorKind::AlreadyExists.into());
                }
                if options.truncate && options.writes() {
                    persist(&self.key, path, &[]).await?;
                    HandleState::File(PlaintextBuffer::default())
                } else {
                    HandleState::File(self.load(path).await?)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !(options.create || options.create_new) {
                    return Err(e);
                }
                debug!(path = %path.display(), "creating encrypted file");
                self.create_empty(path, mode).await?;
                HandleState::File(PlaintextBuffer::default())
            }
            Err(e) => return Err(e),
        };

        Ok(Box::new(LocalFile {
            path: path.to_path_buf(),
            key: self.key.clone(),
            options,
            state,
        }))
    }

    async fn remove_all(&self, ctx: &CancellationToken, path: &Path) -> io::Result<()> {
        check_cancelled(ctx)?;
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn rename(
        &self,
        ctx: &CancellationToken,
        old_path: &Path,
        new_path: &Path,
    ) -> io::Result<()> {
        check_cancelled(ctx)?;
        tokio::fs::rename(old_path, new_path).await
    }

    async fn stat(&self, ctx: &CancellationToken, path: &Path) -> io::Result<FileMetadata> {
        check_cancelled(ctx)?;
        let meta = tokio::fs::metadata(path).await?;
        Ok(to_metadata(path, &meta))
    }
}

#[derive(Debug)]
enum HandleState {
    File(PlaintextBuffer),
    Directory,
    Closed,
}

/// Open handle on a local encrypted file or directory.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    key: MasterKey,
    options: OpenOptions,
    state: HandleState,
}

fn closed() -> io::Error {
    io::Error::other("file already closed")
}

impl LocalFile {
    fn buffer(&mut self) -> io::Result<&mut PlaintextBuffer> {
        match &mut self.state {
            HandleState::File(buf) => Ok(buf),
            HandleState::Directory => Err(io::ErrorKind::IsADirectory.into()),
            HandleState::Closed => Err(closed()),
        }
    }
}

#[async_trait]
impl StorageFile for LocalFile {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let readable = self.options.read;
        let buffer = self.buffer()?;
        if !readable {
            return Err(io::ErrorKind::PermissionDenied.into());
        }
        Ok(buffer.read(buf))
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (writable, append) = (self.options.writes(), self.options.append);
        let buffer = self.buffer()?;
        if !writable {
            return Err(io::ErrorKind::PermissionDenied.into());
        }
        buffer.write(buf, append)
    }

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.state {
            HandleState::File(buffer) => buffer.seek(pos),
            HandleState::Directory => Ok(0),
            HandleState::Closed => Err(closed()),
        }
    }

    async fn read_dir(&mut self) -> io::Result<Vec<FileMetadata>> {
        match self.state {
            HandleState::Directory => {}
            HandleState::File(_) => return Err(io::ErrorKind::NotADirectory.into()),
            HandleState::Closed => return Err(closed()),
        }
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let meta = entry.metadata().await?;
            entries.push(to_metadata(&path, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self) -> io::Result<FileMetadata> {
        if let HandleState::Closed = self.state {
            return Err(closed());
        }
        let meta = tokio::fs::metadata(&self.path).await?;
        let mut info = to_metadata(&self.path, &meta);
        // Unflushed writes are visible through the handle that made them
        if let HandleState::File(buffer) = &self.state
            && buffer.is_dirty()
        {
            info.size = buffer.len();
        }
        Ok(info)
    }

    async fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            HandleState::File(buffer) if buffer.is_dirty() => {
                persist(&self.key, &self.path, buffer.as_slice()).await?;
                buffer.mark_clean();
                Ok(())
            }
            HandleState::Closed => Err(closed()),
            _ => Ok(()),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.state = HandleState::Closed;
        Ok(())
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if let HandleState::File(buffer) = &self.state
            && buffer.is_dirty()
        {
            warn!(
                path = %self.path.display(),
                "discarding unflushed writes on dropped handle"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptdav_core::testutil::StorageTests;

    #[tokio::test]
    async fn test_local_engine() {
        let temp_dir = tempfile::tempdir().unwrap();
        let engine = LocalEncryptedFs::new(MasterKey::from_bytes([7u8; 32]));
        StorageTests::new(&engine, temp_dir.path())
            .run_all()
            .await
            .unwrap();
    }
}
