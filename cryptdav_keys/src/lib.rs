//! Master key bootstrap.
//!
//! A process picks its key source exactly once, before it starts serving:
//!
//! ```text
//! DEBUG_ENCRYPTION_KEY (env)
//!     |
//!     +-- is_on(..) == true  -> KeySource::Fixed(all-zero key)
//!     |
//!     +-- otherwise          -> KeySource::SecureCache(key store)
//!                                   |
//!                                   +-> loaded once, cached in KeyProvider
//! ```
//!
//! The production path never falls back to the debug key: if the key store
//! cannot produce a key, [`KeyProvider::obtain_master_key`] returns an error
//! and the caller must not start.

mod flag;
mod key_file;
mod provider;

pub use flag::{DEBUG_KEY_ENV, is_on};
pub use key_file::{KeyFileStore, generate_key_file, parse_key_bytes, parse_key_string};
pub use provider::{KeyProvider, KeySource, SecureKeyStore};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a master key from being obtained. All of them are
/// fatal for startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write key file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {0} does not hold a 32-byte key (hex, base64 or raw)")]
    Malformed(PathBuf),
    #[error("key file {0} holds an all-zero key, refusing to use it in production")]
    WeakKey(PathBuf),
    #[error("key store unavailable: {0}")]
    Unavailable(String),
}
