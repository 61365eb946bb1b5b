//! The master key storage engines are initialized with.

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::CryptoError;

const FINGERPRINT_CONTEXT: &str = "cryptdav/master-key/fingerprint";

/// 32 secret bytes, zeroed on drop.
///
/// Clones share one allocation, so handing the key to an engine and keeping
/// it in a provider cache does not multiply copies of the secret.
#[derive(Clone)]
pub struct MasterKey(Arc<Zeroizing<[u8; MasterKey::LEN]>>);

impl MasterKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(Arc::new(Zeroizing::new(bytes)))
    }

    /// Builds a key from raw bytes of unknown length.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self::from_bytes(arr))
    }

    /// The all-zero key used for reproducible local development.
    pub fn zeroed() -> Self {
        Self::from_bytes([0u8; Self::LEN])
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Short, non-reversible identifier for logs and `check` output.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::derive_key(FINGERPRINT_CONTEXT, &self.0[..]);
        hex::encode(&digest[..8])
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for MasterKey {}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey({})", self.fingerprint())
    }
}
