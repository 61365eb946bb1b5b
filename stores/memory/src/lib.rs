use async_trait::async_trait;
use bytes::Bytes;
use cryptdav_core::crypto;
use cryptdav_core::storage::{check_cancelled, file_name};
use cryptdav_core::{
    CancellationToken, EncryptedStorage, FileKind, FileMetadata, MasterKey, OpenOptions,
    PlaintextBuffer, StorageFile,
};
use std::collections::BTreeMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Node {
    Directory {
        mode: u32,
        modified: SystemTime,
    },
    File {
        sealed: Bytes,
        mode: u32,
        modified: SystemTime,
    },
}

impl Node {
    fn metadata(&self, path: &Path) -> FileMetadata {
        match self {
            Node::Directory { mode, modified } => FileMetadata {
                name: file_name(path),
                kind: FileKind::Directory,
                size: 0,
                mode: *mode,
                modified: *modified,
            },
            Node::File {
                sealed,
                mode,
                modified,
            } => FileMetadata {
                name: file_name(path),
                kind: FileKind::File,
                size: crypto::plaintext_len(sealed.len() as u64),
                mode: *mode,
                modified: *modified,
            },
        }
    }
}

type Tree = BTreeMap<PathBuf, Node>;

/// Encrypted engine that keeps its whole tree in memory.
///
/// File bodies are held sealed, exactly as the local engine writes them to
/// disk. `/` exists from the start; everything else is created through the
/// capability. Whole-tree operations (rename, remove_all) run under one write
/// lock and are atomic.
#[derive(Debug, Clone)]
pub struct MemoryEncryptedFs {
    key: MasterKey,
    nodes: Arc<RwLock<Tree>>,
}

impl MemoryEncryptedFs {
    /// Creates a new, empty tree containing only `/`.
    pub fn new(key: MasterKey) -> Self {
        let mut tree = Tree::new();
        tree.insert(
            PathBuf::from("/"),
            Node::Directory {
                mode: 0o755,
                modified: SystemTime::now(),
            },
        );
        Self {
            key,
            nodes: Arc::new(RwLock::new(tree)),
        }
    }

    /// Raw sealed bytes of a file, for tests that inspect data at rest.
    pub async fn sealed_contents(&self, path: &Path) -> Option<Bytes> {
        match self.nodes.read().await.get(path) {
            Some(Node::File { sealed, .. }) => Some(sealed.clone()),
            _ => None,
        }
    }
}

fn check_parent(tree: &Tree, path: &Path) -> io::Result<()> {
    match path.parent() {
        None => Ok(()),
        Some(parent) if parent.as_os_str().is_empty() => Ok(()),
        Some(parent) => match tree.get(parent) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(io::ErrorKind::NotADirectory.into()),
            None => Err(io::ErrorKind::NotFound.into()),
        },
    }
}

fn has_children(tree: &Tree, path: &Path) -> bool {
    tree.keys().any(|k| k.parent() == Some(path))
}

#[async_trait]
impl EncryptedStorage for MemoryEncryptedFs {
    async fn mkdir(&self, ctx: &CancellationToken, path: &Path, mode: u32) -> io::Result<()> {
        check_cancelled(ctx)?;
        let mut tree = self.nodes.write().await;
        if tree.contains_key(path) {
            return Err(io::ErrorKind::AlreadyExists.into());
        }
        check_parent(&tree, path)?;
        tree.insert(
            path.to_path_buf(),
            Node::Directory {
                mode,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        path: &Path,
        options: OpenOptions,
        mode: u32,
    ) -> io::Result<Box<dyn StorageFile>> {
        check_cancelled(ctx)?;
        let mut tree = self.nodes.write().await;
        let state = match tree.get_mut(path) {
            Some(Node::Directory { .. }) => {
                if options.create_new {
                    return Err(io::ErrorKind::AlreadyExists.into());
                }
                if options.writes() {
                    return Err(io::ErrorKind::IsADirectory.into());
                }
                HandleState::Directory
            }
            Some(Node::File {
                sealed, modified, ..
            }) => {
                if options.create_new {
                    return Err(io::ErrorKind::AlreadyExists.into());
                }
                if options.truncate && options.writes() {
                    *sealed = Bytes::from(crypto::encrypt_file(&self.key, &[])?);
                    *modified = SystemTime::now();
                    HandleState::File(PlaintextBuffer::default())
                } else {
                    let plain = crypto::decrypt_file(&self.key, sealed)?;
                    HandleState::File(PlaintextBuffer::new(plain))
                }
            }
            None => {
                if !(options.create || options.create_new) {
                    return Err(io::ErrorKind::NotFound.into());
                }
                check_parent(&tree, path)?;
                let sealed = Bytes::from(crypto::encrypt_file(&self.key, &[])?);
                tree.insert(
                    path.to_path_buf(),
                    Node::File {
                        sealed,
                        mode,
                        modified: SystemTime::now(),
                    },
                );
                HandleState::File(PlaintextBuffer::default())
            }
        };

        Ok(Box::new(MemoryFile {
            path: path.to_path_buf(),
            key: self.key.clone(),
            nodes: self.nodes.clone(),
            options,
            state,
        }))
    }

    async fn remove_all(&self, ctx: &CancellationToken, path: &Path) -> io::Result<()> {
        check_cancelled(ctx)?;
        self.nodes.write().await.retain(|k, _| !k.starts_with(path));
        Ok(())
    }

    async fn rename(
        &self,
        ctx: &CancellationToken,
        old_path: &Path,
        new_path: &Path,
    ) -> io::Result<()> {
        check_cancelled(ctx)?;
        let mut tree = self.nodes.write().await;
        let source_is_dir = match tree.get(old_path) {
            Some(node) => matches!(node, Node::Directory { .. }),
            None => return Err(io::ErrorKind::NotFound.into()),
        };
        if old_path == new_path {
            return Ok(());
        }
        if new_path.starts_with(old_path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot move a directory into itself",
            ));
        }
        check_parent(&tree, new_path)?;
        match tree.get(new_path) {
            Some(Node::Directory { .. }) if !source_is_dir => {
                return Err(io::ErrorKind::IsADirectory.into());
            }
            Some(Node::Directory { .. }) if has_children(&tree, new_path) => {
                return Err(io::ErrorKind::DirectoryNotEmpty.into());
            }
            Some(Node::File { .. }) if source_is_dir => {
                return Err(io::ErrorKind::NotADirectory.into());
            }
            _ => {}
        }

        tree.remove(new_path);
        let moved: Vec<PathBuf> = tree
            .keys()
            .filter(|k| k.starts_with(old_path))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = tree.remove(&key) {
                let rest = key.strip_prefix(old_path).unwrap_or(Path::new(""));
                let target = if rest.as_os_str().is_empty() {
                    new_path.to_path_buf()
                } else {
                    new_path.join(rest)
                };
                tree.insert(target, node);
            }
        }
        Ok(())
    }

    async fn stat(&self, ctx: &CancellationToken, path: &Path) -> io::Result<FileMetadata> {
        check_cancelled(ctx)?;
        self.nodes
            .read()
            .await
            .get(path)
            .map(|node| node.metadata(path))
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }
}

#[derive(Debug)]
enum HandleState {
    File(PlaintextBuffer),
    Directory,
    Closed,
}

/// Open handle on a file or directory of a [`MemoryEncryptedFs`].
#[derive(Debug)]
pub struct MemoryFile {
    path: PathBuf,
    key: MasterKey,
    nodes: Arc<RwLock<Tree>>,
    options: OpenOptions,
    state: HandleState,
}

fn closed() -> io::Error {
    io::Error::other("file already closed")
}

impl MemoryFile {
    fn buffer(&mut self) -> io::Result<&mut PlaintextBuffer> {
        match &mut self.state {
            HandleState::File(buf) => Ok(buf),
            HandleState::Directory => Err(io::ErrorKind::IsADirectory.into()),
            HandleState::Closed => Err(closed()),
        }
    }
}

#[async_trait]
impl StorageFile for MemoryFile {
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
        let tree = self.nodes.read().await;
        if !tree.contains_key(&self.path) {
            return Err(io::ErrorKind::NotFound.into());
        }
        let mut entries: Vec<FileMetadata> = tree
            .iter()
            .filter(|(k, _)| k.parent() == Some(self.path.as_path()))
            .map(|(k, node)| node.metadata(k))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self) -> io::Result<FileMetadata> {
        if let HandleState::Closed = self.state {
            return Err(closed());
        }
        let mut info = self
            .nodes
            .read()
            .await
            .get(&self.path)
            .map(|node| node.metadata(&self.path))
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        if let HandleState::File(buffer) = &self.state
            && buffer.is_dirty()
        {
            info.size = buffer.len();
        }
        Ok(info)
    }

    async fn flush(&mut self) -> io::Result<()> {
        let buffer = match &mut self.state {
            HandleState::File(buffer) if buffer.is_dirty() => buffer,
            HandleState::Closed => return Err(closed()),
            _ => return Ok(()),
        };
        let sealed = Bytes::from(crypto::encrypt_file(&self.key, buffer.as_slice())?);
        let mut tree = self.nodes.write().await;
        let mode = match tree.get(&self.path) {
            Some(Node::File { mode, .. }) => *mode,
            Some(Node::Directory { .. }) => return Err(io::ErrorKind::IsADirectory.into()),
            None => {
                check_parent(&tree, &self.path)?;
                0o644
            }
        };
        tree.insert(
            self.path.clone(),
            Node::File {
                sealed,
                mode,
                modified: SystemTime::now(),
            },
        );
        buffer.mark_clean();
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.state = HandleState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptdav_core::testutil::StorageTests;

    fn engine() -> MemoryEncryptedFs {
        MemoryEncryptedFs::new(MasterKey::from_bytes([9u8; 32]))
    }

    #[tokio::test]
    async fn test_memory_engine() {
        let engine = engine();
        StorageTests::new(&engine, "/").run_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_contents_are_sealed() {
        let engine = engine();
        let ctx = CancellationToken::new();
        let path = Path::new("/secret.txt");
        let opts = OpenOptions::new().write(true).create(true);
        let mut file = engine.open_file(&ctx, path, opts, 0o600).await.unwrap();
        file.write_all(b"attack at dawn").await.unwrap();
        file.close().await.unwrap();

        let sealed = engine.sealed_contents(path).await.unwrap();
        assert_eq!(&sealed[..4], b"CDV1");
        assert!(!sealed.windows(14).any(|w| w == b"attack at dawn"));
        assert_eq!(engine.stat(&ctx, path).await.unwrap().mode, 0o600);
    }

    #[tokio::test]
    async fn test_rename_onto_non_empty_directory_fails() {
        let engine = engine();
        let ctx = CancellationToken::new();
        engine.mkdir(&ctx, Path::new("/a"), 0o755).await.unwrap();
        engine.mkdir(&ctx, Path::new("/b"), 0o755).await.unwrap();
        engine.mkdir(&ctx, Path::new("/b/c"), 0o755).await.unwrap();

        let err = engine
            .rename(&ctx, Path::new("/a"), Path::new("/b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);

        let err = engine
            .rename(&ctx, Path::new("/a"), Path::new("/a/inside"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_remove_all_is_prefix_safe() {
        let engine = engine();
        let ctx = CancellationToken::new();
        engine.mkdir(&ctx, Path::new("/app"), 0o755).await.unwrap();
        engine.mkdir(&ctx, Path::new("/apple"), 0o755).await.unwrap();

        engine.remove_all(&ctx, Path::new("/app")).await.unwrap();
        assert!(engine.stat(&ctx, Path::new("/app")).await.is_err());
        assert!(engine.stat(&ctx, Path::new("/apple")).await.is_ok());
    }
}
