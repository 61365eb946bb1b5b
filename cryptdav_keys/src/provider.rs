use cryptdav_core::MasterKey;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::KeyError;
use crate::flag::{DEBUG_KEY_ENV, is_on};

/// Production backend holding the master key.
///
/// Implementations may be slow (OS keychain, remote KMS); [`KeyProvider`]
/// calls them at most once per successful load.
pub trait SecureKeyStore: Debug + Send + Sync {
    fn load_master_key(&self) -> Result<MasterKey, KeyError>;
}

/// Where the master key comes from. Chosen once per process.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Debug mode: a fixed key known to everyone. Never use with real data.
    Fixed(MasterKey),
    /// Production mode: loaded from the store on first use, then cached.
    SecureCache(Arc<dyn SecureKeyStore>),
}

#[derive(Debug)]
pub struct KeyProvider {
    source: KeySource,
    cached: Mutex<Option<MasterKey>>,
}

impl KeyProvider {
    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Selects the key source from the `DEBUG_ENCRYPTION_KEY` environment
    /// variable.
    pub fn from_env(store: Arc<dyn SecureKeyStore>) -> Self {
        let flag = std::env::var(DEBUG_KEY_ENV).ok();
        Self::select(flag.as_deref(), store)
    }

    /// Selects the key source from an already-read flag value. An absent flag
    /// is the same as an off one.
    pub fn select(flag: Option<&str>, store: Arc<dyn SecureKeyStore>) -> Self {
        if flag.is_some_and(is_on) {
            warn!(
                env = DEBUG_KEY_ENV,
                "using the fixed all-zero debug key; stored data is NOT confidential"
            );
            Self::new(KeySource::Fixed(MasterKey::zeroed()))
        } else {
            info!(store = ?store, "using secure key store for the master key");
            Self::new(KeySource::SecureCache(store))
        }
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    pub fn is_debug(&self) -> bool {
        matches!(self.source, KeySource::Fixed(_))
    }

    /// Returns the master key, loading it from the secure store on first
    /// use. Failures are not cached; there is no fallback to the debug key.
    pub fn obtain_master_key(&self) -> Result<MasterKey, KeyError> {
        match &self.source {
            KeySource::Fixed(key) => Ok(key.clone()),
            KeySource::SecureCache(store) => {
                let mut cached = self
                    .cached
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(key) = cached.as_ref() {
                    return Ok(key.clone());
                }
                debug!("loading master key from secure store");
                let key = store.load_master_key()?;
                *cached = Some(key.clone());
                Ok(key)
            }
        }
    }
}
