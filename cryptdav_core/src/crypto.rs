//! Chunked encryption of file bodies.
//!
//! Layout of an encrypted file:
//!
//! ```text
//! "CDV1" | salt (32 bytes) | chunk 0 | chunk 1 | ... | chunk n (final)
//! ```
//!
//! Every chunk is at most [`CHUNK_SIZE`] bytes of plaintext sealed with
//! XChaCha20-Poly1305, so it occupies `len + TAG_LEN` bytes on disk. The file
//! key is derived from the master key and the per-file salt with BLAKE3
//! `derive_key`. The nonce is the chunk index (little-endian) followed by a
//! final-chunk marker, so dropping or reordering chunks fails authentication.
//! An empty file still carries one empty final chunk.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::MasterKey;

pub const MAGIC: [u8; 4] = *b"CDV1";
pub const SALT_LEN: usize = 32;
pub const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;
pub const CHUNK_SIZE: usize = 64 * 1024;
pub const TAG_LEN: usize = 16;

const FILE_KEY_CONTEXT: &str = "cryptdav/file/xchacha20";

/// Errors that can occur while sealing or opening file bodies.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("Not an encrypted file: missing or damaged header")]
    BadHeader,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed at chunk {0}: invalid ciphertext or wrong key")]
    DecryptionFailed(u64),
}

impl From<CryptoError> for std::io::Error {
    fn from(err: CryptoError) -> Self {
        let kind = match err {
            CryptoError::InvalidKeyLength(_) => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, err)
    }
}

fn file_cipher(master: &MasterKey, salt: &[u8]) -> XChaCha20Poly1305 {
    let mut material = Zeroizing::new([0u8; MasterKey::LEN + SALT_LEN]);
    material[..MasterKey::LEN].copy_from_slice(master.as_bytes());
    material[MasterKey::LEN..].copy_from_slice(salt);
    let file_key = Zeroizing::new(blake3::derive_key(FILE_KEY_CONTEXT, &material[..]));
    XChaCha20Poly1305::new(Key::from_slice(&file_key[..]))
}

fn chunk_nonce(index: u64, last: bool) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..8].copy_from_slice(&index.to_le_bytes());
    nonce[8] = last as u8;
    nonce
}

/// Encrypts a whole file body under a fresh random salt.
pub fn encrypt_file(master: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    encrypt_file_with_salt(master, &salt, plaintext)
}

/// Encrypts a whole file body under the given salt.
pub fn encrypt_file_with_salt(
    master: &MasterKey,
    salt: &[u8; SALT_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = file_cipher(master, salt);

    let chunks: Vec<&[u8]> = if plaintext.is_empty() {
        vec![&[]]
    } else {
        plaintext.chunks(CHUNK_SIZE).collect()
    };
    let last = chunks.len() - 1;

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + chunks.len() * TAG_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(salt);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let nonce = chunk_nonce(index as u64, index == last);
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), chunk)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        out.extend_from_slice(&sealed);
    }
    Ok(out)
}

/// Decrypts a whole file body produced by [`encrypt_file`].
pub fn decrypt_file(master: &MasterKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < HEADER_LEN + TAG_LEN || data[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::BadHeader);
    }
    let cipher = file_cipher(master, &data[MAGIC.len()..HEADER_LEN]);
    let body = &data[HEADER_LEN..];

    let chunks: Vec<&[u8]> = body.chunks(CHUNK_SIZE + TAG_LEN).collect();
    let last = chunks.len() - 1;

    let mut out = Vec::with_capacity(plaintext_len(data.len() as u64) as usize);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let nonce = chunk_nonce(index as u64, index == last);
        let opened = cipher
            .decrypt(XNonce::from_slice(&nonce), chunk)
            .map_err(|_| CryptoError::DecryptionFailed(index as u64))?;
        out.extend_from_slice(&opened);
    }
    Ok(out)
}

/// Plaintext size of an encrypted file of `ciphertext_len` bytes.
///
/// Needs no key, so `stat` never decrypts.
pub fn plaintext_len(ciphertext_len: u64) -> u64 {
    let body = ciphertext_len.saturating_sub(HEADER_LEN as u64);
    if body == 0 {
        return 0;
    }
    let chunks = body.div_ceil((CHUNK_SIZE + TAG_LEN) as u64);
    body.saturating_sub(chunks * TAG_LEN as u64)
}
