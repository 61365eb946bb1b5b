use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptdavConfig {
    pub serve: ServeConfig,
    pub key: KeyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServeConfig {
    /// Directory exposed to clients as `/`
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyConfig {
    /// Master key file, relative paths are resolved against the config
    /// file's directory
    pub file: PathBuf,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// Encrypted files on the local filesystem
    #[default]
    Local,
    /// Encrypted files held in memory, gone when the process exits
    Memory,
}

impl CryptdavConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string(self).context("failed to serialize config")
    }

    pub fn key_file_path(&self, config_file: &Path) -> PathBuf {
        if self.key.file.is_absolute() {
            return self.key.file.clone();
        }
        match config_file.parent() {
            Some(dir) => dir.join(&self.key.file),
            None => self.key.file.clone(),
        }
    }
}
