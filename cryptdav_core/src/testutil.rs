//! Test utilities for `EncryptedStorage` implementations.
//!
//! This module provides a test suite that can be run against any engine to
//! verify it honors the capability contract the bridge relies on.
//!
//! # Usage
//!
//! In your engine crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! cryptdav_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use cryptdav_core::testutil::StorageTests;
//!
//! #[tokio::test]
//! async fn test_my_engine() {
//!     let engine = MyEngine::new(key);
//!     StorageTests::new(&engine, base_dir).run_all().await.unwrap();
//! }
//! ```

use crate::storage::{EncryptedStorage, OpenOptions, StorageFile};
use crate::CancellationToken;
use rand::Rng;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

/// Test suite for `EncryptedStorage` implementations.
pub struct StorageTests<'a, S> {
    storage: &'a S,
    /// Directory all test entries are created under
    base: PathBuf,
    ctx: CancellationToken,
}

impl<'a, S: EncryptedStorage> StorageTests<'a, S> {
    /// Create a new test suite rooted in a random directory below `parent`.
    pub fn new(storage: &'a S, parent: impl AsRef<Path>) -> Self {
        let base = parent
            .as_ref()
            .join(format!("_test_{}", rand::rng().random::<u32>()));
        Self::with_base(storage, base)
    }

    /// Create a new test suite with a fixed base directory.
    pub fn with_base(storage: &'a S, base: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            base: base.into(),
            ctx: CancellationToken::new(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> io::Result<()> {
        self.storage.mkdir(&self.ctx, &self.base, 0o755).await?;

        self.test_mkdir_stat().await?;
        self.test_mkdir_existing().await?;
        self.test_write_read().await?;
        self.test_open_missing().await?;
        self.test_create_new().await?;
        self.test_truncate().await?;
        self.test_append().await?;
        self.test_seek().await?;
        self.test_write_past_end().await?;
        self.test_large_file().await?;
        self.test_read_dir().await?;
        self.test_read_only_handle().await?;
        self.test_rename().await?;
        self.test_remove_all().await?;

        // Cleanup
        self.storage.remove_all(&self.ctx, &self.base).await?;

        Ok(())
    }

    async fn put(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let opts = OpenOptions::new().write(true).create(true).truncate(true);
        let mut file = self.storage.open_file(&self.ctx, path, opts, 0o644).await?;
        file.write_all(data).await?;
        file.close().await
    }

    async fn get(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut file = self
            .storage
            .open_file(&self.ctx, path, OpenOptions::new().read(true), 0)
            .await?;
        let mut out = Vec::new();
        file.read_to_end(&mut out).await?;
        file.close().await?;
        Ok(out)
    }

    /// Test directory creation is visible through stat.
    pub async fn test_mkdir_stat(&self) -> io::Result<()> {
        let path = self.path("dir");
        self.storage.mkdir(&self.ctx, &path, 0o755).await?;

        let meta = self.storage.stat(&self.ctx, &path).await?;
        assert!(meta.is_dir(), "mkdir should create a directory");
        assert_eq!(meta.name, "dir");

        Ok(())
    }

    /// Test mkdir on an existing entry or below a missing parent.
    pub async fn test_mkdir_existing(&self) -> io::Result<()> {
        let path = self.path("dup");
        self.storage.mkdir(&self.ctx, &path, 0o755).await?;

        let err = self.storage.mkdir(&self.ctx, &path, 0o755).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let orphan = self.path("missing-parent/child");
        let err = self.storage.mkdir(&self.ctx, &orphan, 0o755).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        Ok(())
    }

    /// Test basic write then read.
    pub async fn test_write_read(&self) -> io::Result<()> {
        let path = self.path("hello.txt");
        self.put(&path, b"hello, world!").await?;

        assert_eq!(self.get(&path).await?, b"hello, world!");

        let meta = self.storage.stat(&self.ctx, &path).await?;
        assert!(meta.is_file());
        assert_eq!(meta.size, 13, "stat should report plaintext size");

        Ok(())
    }

    /// Test opening a missing file without `create`.
    pub async fn test_open_missing(&self) -> io::Result<()> {
        let path = self.path("nope.txt");
        let err = self
            .storage
            .open_file(&self.ctx, &path, OpenOptions::new().read(true), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err = self.storage.stat(&self.ctx, &path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        Ok(())
    }

    /// Test `create_new` creates once and refuses afterwards.
    pub async fn test_create_new(&self) -> io::Result<()> {
        let path = self.path("fresh.txt");
        let opts = OpenOptions::new().write(true).create_new(true);

        let mut file = self.storage.open_file(&self.ctx, &path, opts, 0o600).await?;
        assert_eq!(
            self.storage.stat(&self.ctx, &path).await?.size,
            0,
            "create should materialize an empty file immediately"
        );
        file.close().await?;

        let err = self
            .storage
            .open_file(&self.ctx, &path, opts, 0o600)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        Ok(())
    }

    /// Test truncating an existing file.
    pub async fn test_truncate(&self) -> io::Result<()> {
        let path = self.path("truncate.txt");
        self.put(&path, b"original content").await?;
        self.put(&path, b"new").await?;

        assert_eq!(self.get(&path).await?, b"new");

        Ok(())
    }

    /// Test appending to an existing file.
    pub async fn test_append(&self) -> io::Result<()> {
        let path = self.path("append.txt");
        self.put(&path, b"abc").await?;

        let opts = OpenOptions::new().append(true);
        let mut file = self.storage.open_file(&self.ctx, &path, opts, 0).await?;
        file.write_all(b"def").await?;
        file.close().await?;

        assert_eq!(self.get(&path).await?, b"abcdef");

        Ok(())
    }

    /// Test seeking and partial reads and writes.
    pub async fn test_seek(&self) -> io::Result<()> {
        let path = self.path("seek.bin");
        self.put(&path, b"0123456789abcdef").await?;

        let opts = OpenOptions::new().read(true).write(true);
        let mut file = self.storage.open_file(&self.ctx, &path, opts, 0).await?;
        file.seek(SeekFrom::Start(4)).await?;
        let mut buf = [0u8; 4];
        let n = file.read(&mut buf).await?;
        assert_eq!(&buf[..n], b"4567", "offset read should work");

        file.seek(SeekFrom::End(-2)).await?;
        file.write_all(b"XY").await?;
        file.close().await?;

        assert_eq!(self.get(&path).await?, b"0123456789abcdXY");

        Ok(())
    }

    /// Test writes beyond the end: gaps read back as zeros, absurd offsets
    /// fail without touching the stored file.
    pub async fn test_write_past_end(&self) -> io::Result<()> {
        let path = self.path("sparse.bin");
        self.put(&path, b"abc").await?;

        let opts = OpenOptions::new().read(true).write(true);
        let mut file = self.storage.open_file(&self.ctx, &path, opts, 0).await?;
        file.seek(SeekFrom::Start(6)).await?;
        file.write_all(b"z").await?;
        file.close().await?;
        assert_eq!(self.get(&path).await?, b"abc\0\0\0z");

        let mut file = self.storage.open_file(&self.ctx, &path, opts, 0).await?;
        file.seek(SeekFrom::Start(u64::MAX - 1)).await?;
        let err = file.write(b"abcd").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        file.seek(SeekFrom::Start(1 << 40)).await?;
        let err = file.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::FileTooLarge);
        file.close().await?;
        assert_eq!(self.get(&path).await?, b"abc\0\0\0z");

        Ok(())
    }

    /// Test a file spanning several encryption chunks.
    pub async fn test_large_file(&self) -> io::Result<()> {
        let path = self.path("large.bin");
        let data = random_bytes(3 * crate::crypto::CHUNK_SIZE + 17);
        self.put(&path, &data).await?;

        assert_eq!(self.storage.stat(&self.ctx, &path).await?.size, data.len() as u64);
        assert!(self.get(&path).await? == data, "large file content mismatch");

        Ok(())
    }

    /// Test listing a directory through its handle.
    pub async fn test_read_dir(&self) -> io::Result<()> {
        let dir = self.path("listing");
        self.storage.mkdir(&self.ctx, &dir, 0o755).await?;
        self.put(&dir.join("b.txt"), b"bb").await?;
        self.put(&dir.join("a.txt"), b"a").await?;
        self.storage.mkdir(&self.ctx, &dir.join("sub"), 0o755).await?;

        let mut handle = self
            .storage
            .open_file(&self.ctx, &dir, OpenOptions::new().read(true), 0)
            .await?;
        let entries = handle.read_dir().await?;
        handle.close().await?;

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[1].size, 2);
        assert!(entries[2].is_dir());

        Ok(())
    }

    /// Test writes through a read-only handle are refused.
    pub async fn test_read_only_handle(&self) -> io::Result<()> {
        let path = self.path("ro.txt");
        self.put(&path, b"keep").await?;

        let mut file = self
            .storage
            .open_file(&self.ctx, &path, OpenOptions::new().read(true), 0)
            .await?;
        let err = file.write(b"nope").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        file.close().await?;

        assert_eq!(self.get(&path).await?, b"keep");

        Ok(())
    }

    /// Test rename of a file and of a directory with contents.
    pub async fn test_rename(&self) -> io::Result<()> {
        let old_path = self.path("rename_old.txt");
        let new_path = self.path("rename_new.txt");
        self.put(&old_path, b"rename me").await?;

        self.storage.rename(&self.ctx, &old_path, &new_path).await?;

        let err = self.storage.stat(&self.ctx, &old_path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(
            self.get(&new_path).await?,
            b"rename me",
            "content should be preserved after rename"
        );

        let old_dir = self.path("dir_old");
        let new_dir = self.path("dir_new");
        self.storage.mkdir(&self.ctx, &old_dir, 0o755).await?;
        self.put(&old_dir.join("inner.txt"), b"inner").await?;
        self.storage.rename(&self.ctx, &old_dir, &new_dir).await?;
        assert_eq!(self.get(&new_dir.join("inner.txt")).await?, b"inner");
        assert!(self.storage.stat(&self.ctx, &old_dir.join("inner.txt")).await.is_err());

        Ok(())
    }

    /// Test recursive removal.
    pub async fn test_remove_all(&self) -> io::Result<()> {
        let dir = self.path("tree");
        self.storage.mkdir(&self.ctx, &dir, 0o755).await?;
        self.storage.mkdir(&self.ctx, &dir.join("nested"), 0o755).await?;
        self.put(&dir.join("nested/leaf.txt"), b"leaf").await?;

        self.storage.remove_all(&self.ctx, &dir).await?;
        let err = self.storage.stat(&self.ctx, &dir).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        // Removing something that is not there succeeds
        self.storage.remove_all(&self.ctx, &dir).await?;

        let file = self.path("single.txt");
        self.put(&file, b"x").await?;
        self.storage.remove_all(&self.ctx, &file).await?;
        assert!(self.storage.stat(&self.ctx, &file).await.is_err());

        Ok(())
    }
}

/// Generate random bytes for testing.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    data
}
