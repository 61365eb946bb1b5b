//! Core cryptdav types and traits.
//!
//! This crate defines what every other cryptdav crate agrees on:
//!
//! - [`MasterKey`], the secret every storage engine is initialized with
//! - the on-disk chunk format for encrypted file bodies ([`crypto`])
//! - the storage capability ([`EncryptedStorage`], [`StorageFile`]) that
//!   engines implement and the bridge consumes
//!
//! Engines live in their own crates (`cryptdav_store_local`,
//! `cryptdav_store_memory`). The bridge in `cryptdav_bridge` never touches
//! ciphertext directly; it only talks to an engine through these traits.

pub mod buffer;
pub mod crypto;
pub mod key;
pub mod storage;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use buffer::PlaintextBuffer;
pub use crypto::CryptoError;
pub use key::MasterKey;
pub use storage::{EncryptedStorage, FileKind, FileMetadata, OpenOptions, StorageFile};

/// Request context handed from the protocol layer down to the engine.
pub use tokio_util::sync::CancellationToken;
