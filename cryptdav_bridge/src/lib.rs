//! The trust boundary between a remote file-access protocol and an encrypted
//! storage engine.
//!
//! Every path handed to a [`FileSystem`] comes from an untrusted client. The
//! [`Bridge`] confines it to the serving root with [`PathResolver`], refuses
//! to remove or rename the root itself, and forwards everything else to the
//! engine unchanged.

mod bridge;
mod error;
mod resolver;

pub use bridge::Bridge;
pub use error::FsError;
pub use resolver::{PathResolver, slash_clean};

use async_trait::async_trait;
use cryptdav_core::{CancellationToken, FileMetadata, OpenOptions, StorageFile};

/// Filesystem capability consumed by a protocol server. Paths are protocol
/// paths: `/`-separated and relative to the served tree.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, mode: u32) -> Result<(), FsError>;

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        name: &str,
        options: OpenOptions,
        mode: u32,
    ) -> Result<Box<dyn StorageFile>, FsError>;

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> Result<(), FsError>;

    async fn rename(
        &self,
        ctx: &CancellationToken,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), FsError>;

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> Result<FileMetadata, FsError>;
}
