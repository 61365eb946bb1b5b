use async_trait::async_trait;
use cryptdav_core::{
    CancellationToken, EncryptedStorage, FileMetadata, MasterKey, OpenOptions, StorageFile,
};
use cryptdav_keys::{KeyError, KeyProvider};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{FileSystem, FsError, PathResolver};

/// A [`FileSystem`] serving one root out of one encrypted storage engine.
///
/// Holds no per-request state; share it behind an `Arc`.
#[derive(Debug)]
pub struct Bridge<S> {
    resolver: PathResolver,
    storage: S,
}

impl<S: EncryptedStorage> Bridge<S> {
    /// Obtains the master key from `keys` and hands it to `init` to build the
    /// storage engine.
    ///
    /// Fails if the key cannot be obtained; the bridge never starts without
    /// a key.
    pub fn open(
        root: impl AsRef<Path>,
        keys: &KeyProvider,
        init: impl FnOnce(MasterKey) -> S,
    ) -> Result<Self, KeyError> {
        let key = keys.obtain_master_key()?;
        let resolver = PathResolver::new(root);
        info!(
            root = %resolver.root().display(),
            key = %key.fingerprint(),
            debug_key = keys.is_debug(),
            "bridge ready"
        );
        Ok(Self::from_parts(resolver, init(key)))
    }

    pub fn from_parts(resolver: PathResolver, storage: S) -> Self {
        Self { resolver, storage }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, FsError> {
        self.resolver.resolve(name).ok_or_else(|| {
            debug!(name = %name.escape_debug(), "rejected path");
            FsError::NotFound
        })
    }

    fn protect_root(&self, op: &'static str, path: &Path) -> Result<(), FsError> {
        if self.resolver.is_root(path) {
            debug!(op, "refusing to touch the serving root");
            return Err(FsError::InvalidOperation);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: EncryptedStorage> FileSystem for Bridge<S> {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, mode: u32) -> Result<(), FsError> {
        let path = self.resolve(name)?;
        Ok(self.storage.mkdir(ctx, &path, mode).await?)
    }

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        name: &str,
        options: OpenOptions,
        mode: u32,
    ) -> Result<Box<dyn StorageFile>, FsError> {
        let path = self.resolve(name)?;
        Ok(self.storage.open_file(ctx, &path, options, mode).await?)
    }

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> Result<(), FsError> {
        let path = self.resolve(name)?;
        self.protect_root("remove_all", &path)?;
        Ok(self.storage.remove_all(ctx, &path).await?)
    }

    async fn rename(
        &self,
        ctx: &CancellationToken,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), FsError> {
        let old_path = self.resolve(old_name)?;
        let new_path = self.resolve(new_name)?;
        self.protect_root("rename", &old_path)?;
        self.protect_root("rename", &new_path)?;
        Ok(self.storage.rename(ctx, &old_path, &new_path).await?)
    }

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> Result<FileMetadata, FsError> {
        let path = self.resolve(name)?;
        Ok(self.storage.stat(ctx, &path).await?)
    }
}
