use anyhow::{Context, Result, bail};
use cryptdav_keys::generate_key_file;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{CryptdavConfig, KeyConfig, ServeConfig, StoreConfig};

/// Writes a new profile config and generates its master key next to it.
///
/// An existing key file is reused, never replaced.
pub fn run_init(config_file: &Path, root: &Path, store: StoreConfig) -> Result<CryptdavConfig> {
    if config_file.exists() {
        bail!("config file {} already exists", config_file.display());
    }
    if let Some(dir) = config_file.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let key_file_name = PathBuf::from(
        config_file
            .with_extension("masterkey")
            .file_name()
            .context("config file path has no file name")?,
    );
    let config = CryptdavConfig {
        serve: ServeConfig {
            root: root.to_path_buf(),
        },
        key: KeyConfig {
            file: key_file_name,
        },
        store,
    };

    let key_path = config.key_file_path(config_file);
    if key_path.exists() {
        info!(path = %key_path.display(), "reusing existing master key file");
    } else {
        info!("generating secure random master key");
        generate_key_file(&key_path)?;
    }

    info!("writing to config file {config_file:?}");

    let tmp_path = config_file.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(config.to_toml()?.as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, config_file)?;
    Ok(config)
}
