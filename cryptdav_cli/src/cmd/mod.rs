use anyhow::{Context, Result};
use cryptdav_bridge::{Bridge, FileSystem};
use cryptdav_core::{CancellationToken, EncryptedStorage};
use cryptdav_keys::{KeyFileStore, KeyProvider};
use cryptdav_store_local::LocalEncryptedFs;
use cryptdav_store_memory::MemoryEncryptedFs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{CryptdavConfig, StoreConfig};

mod check;
mod files;
mod init;

pub use check::run_check;
pub use files::{
    format_entry, run_cat, run_get, run_ls, run_mkdir, run_mv, run_put, run_rm, run_stat,
};
pub use init::run_init;

/// Builds the key provider for a profile. `debug_flag` is the raw value of
/// `DEBUG_ENCRYPTION_KEY`, if set.
pub fn key_provider(
    config: &CryptdavConfig,
    config_file: &Path,
    debug_flag: Option<&str>,
) -> KeyProvider {
    let store = KeyFileStore::new(config.key_file_path(config_file));
    KeyProvider::select(debug_flag, Arc::new(store))
}

/// Opens the configured engine behind a [`Bridge`]. `root_override` replaces
/// the configured serving root.
pub async fn open_fs(
    config: &CryptdavConfig,
    keys: &KeyProvider,
    root_override: Option<&Path>,
) -> Result<Arc<dyn FileSystem>> {
    let root: PathBuf = root_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.serve.root.clone());

    let fs: Arc<dyn FileSystem> = match config.store {
        StoreConfig::Local => {
            let bridge = Bridge::open(&root, keys, LocalEncryptedFs::new)
                .context("cannot start without a master key")?;
            Arc::new(bridge)
        }
        StoreConfig::Memory => {
            let bridge = Bridge::open(&root, keys, MemoryEncryptedFs::new)
                .context("cannot start without a master key")?;
            create_ancestors(bridge.storage(), bridge.root()).await?;
            Arc::new(bridge)
        }
    };
    Ok(fs)
}

/// The memory engine starts with only `/`; give it the serving root.
async fn create_ancestors<S: EncryptedStorage>(storage: &S, root: &Path) -> Result<()> {
    let ctx = CancellationToken::new();
    for dir in root.ancestors().collect::<Vec<_>>().into_iter().rev() {
        if dir.as_os_str().is_empty() || dir == Path::new("/") {
            continue;
        }
        match storage.mkdir(&ctx, dir, 0o755).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", dir.display()));
            }
        }
    }
    Ok(())
}
