use base64::Engine;
use cryptdav_core::MasterKey;
use rand::RngCore;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::KeyError;
use crate::provider::SecureKeyStore;

/// Production key store: a 32-byte key kept in a file only the serving user
/// can read.
///
/// The file may hold the key as hex, URL-safe base64 (no padding) or the raw
/// 32 bytes.
#[derive(Debug, Clone)]
pub struct KeyFileStore {
    path: PathBuf,
}

impl KeyFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecureKeyStore for KeyFileStore {
    fn load_master_key(&self) -> Result<MasterKey, KeyError> {
        let bytes = std::fs::read(&self.path).map_err(|source| KeyError::Read {
            path: self.path.clone(),
            source,
        })?;
        warn_if_exposed(&self.path);

        let key = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| parse_key_string(s.trim()))
            .or_else(|| parse_key_bytes(&bytes))
            .ok_or_else(|| KeyError::Malformed(self.path.clone()))?;
        if key.is_zeroed() {
            return Err(KeyError::WeakKey(self.path.clone()));
        }
        info!(
            path = %self.path.display(),
            fingerprint = %key.fingerprint(),
            "loaded master key from key file"
        );
        Ok(key)
    }
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path)
        && meta.permissions().mode() & 0o077 != 0
    {
        warn!(
            path = %path.display(),
            mode = format!("{:o}", meta.permissions().mode() & 0o777),
            "key file is readable by other users"
        );
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

pub fn parse_key_string(s: &str) -> Option<MasterKey> {
    let s = s.trim();
    if let Ok(bytes) = hex::decode(s)
        && let Some(key) = parse_key_bytes(&bytes)
    {
        return Some(key);
    }
    if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
        && let Some(key) = parse_key_bytes(&bytes)
    {
        return Some(key);
    }
    None
}

pub fn parse_key_bytes(bytes: &[u8]) -> Option<MasterKey> {
    MasterKey::try_from_slice(bytes).ok()
}

/// Writes a fresh random key to `path` as hex and returns it.
///
/// Never overwrites an existing file: losing a master key loses every file
/// encrypted with it.
pub fn generate_key_file(path: &Path) -> Result<MasterKey, KeyError> {
    let mut bytes = [0u8; MasterKey::LEN];
    rand::rng().fill_bytes(&mut bytes);
    let key = MasterKey::from_bytes(bytes);

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let write_err = |source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = opts.open(path).map_err(write_err)?;
    file.write_all(hex::encode(key.as_bytes()).as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(write_err)?;

    info!(
        path = %path.display(),
        fingerprint = %key.fingerprint(),
        "generated new master key"
    );
    Ok(key)
}
