use anyhow::{Context, Result};
use cryptdav_core::CancellationToken;
use cryptdav_keys::KeyProvider;
use std::io::Write;
use std::path::Path;

use crate::cmd::open_fs;
use crate::config::CryptdavConfig;

/// Obtains the master key and stats the serving root, reporting both.
pub async fn run_check(
    config: &CryptdavConfig,
    keys: &KeyProvider,
    root_override: Option<&Path>,
    out: &mut impl Write,
) -> Result<()> {
    let key = keys
        .obtain_master_key()
        .context("master key unavailable")?;
    let mode = if keys.is_debug() { "debug" } else { "key file" };
    writeln!(out, "key: {} ({mode})", key.fingerprint())?;

    let fs = open_fs(config, keys, root_override).await?;
    let meta = fs
        .stat(&CancellationToken::new(), "/")
        .await
        .context("serving root is not accessible")?;
    if !meta.is_dir() {
        anyhow::bail!("serving root is not a directory");
    }
    let root = root_override.unwrap_or(config.serve.root.as_path());
    writeln!(out, "root: {} ({:?} store)", root.display(), config.store)?;
    Ok(())
}
