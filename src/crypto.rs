//! AES-256-GCM sealing of pipeline partitions.
//!
//! One key/IV/AAD triple is generated per registered pipeline and shared
//! across its partitions; each partition is encrypted as an independent
//! AEAD message, so every partition gets its own 16-byte authentication
//! tag. Sharing the nonce across partitions under one key is a known
//! weakness of the on-disk format this serves (tags differ, the keystream
//! does not); it is kept for compatibility and flagged here rather than
//! silently fixed.

use aes_gcm::aead::KeyInit;
use aes_gcm::{AeadInPlace, Aes256Gcm, Key, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Key size (256 bits).
pub const KEY_BYTES: usize = 32;
/// Nonce size (96 bits for GCM).
pub const IV_BYTES: usize = 12;
/// Additional authenticated data size.
pub const AAD_BYTES: usize = 64;
/// Authentication tag size (128 bits).
pub const TAG_BYTES: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("authentication failed for partition {index}")]
    AuthenticationFailed { index: usize },

    #[error("invalid tag encoding: {0}")]
    InvalidTag(String),

    #[error("encryption failed for partition {index}")]
    EncryptionFailed { index: usize },
}

/// Key material shared by every partition of one pipeline, plus the
/// per-partition tags. `tags.len()` always equals the partition count;
/// tag `i` authenticates ciphertext `i` only.
#[derive(Clone)]
pub struct EncryptionParameters {
    pub key: [u8; KEY_BYTES],
    pub iv: [u8; IV_BYTES],
    pub aad: [u8; AAD_BYTES],
    pub tags: Vec<[u8; TAG_BYTES]>,
}

impl EncryptionParameters {
    /// Hex rendering of one partition's tag, as carried on the wire.
    pub fn tag_hex(&self, index: usize) -> Option<String> {
        self.tags.get(index).map(hex::encode)
    }

    pub fn tags_hex(&self) -> Vec<String> {
        self.tags.iter().map(hex::encode).collect()
    }
}

impl std::fmt::Debug for EncryptionParameters {
    // Key material stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionParameters")
            .field("partitions", &self.tags.len())
            .finish_non_exhaustive()
    }
}

/// Parse a 32-character hex tag from the wire.
pub fn parse_tag_hex(tag: &str) -> Result<[u8; TAG_BYTES], CryptoError> {
    let bytes = hex::decode(tag).map_err(|e| CryptoError::InvalidTag(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidTag(format!("tag must be {} bytes", TAG_BYTES)))
}

/// Encrypt every partition of a pipeline under fresh key material.
///
/// Returns the shared parameters (with one tag per partition) and the
/// ciphertexts, in partition order.
pub fn seal_pipeline(
    partitions: &[Vec<u8>],
) -> Result<(EncryptionParameters, Vec<Vec<u8>>), CryptoError> {
    let mut key = [0u8; KEY_BYTES];
    let mut iv = [0u8; IV_BYTES];
    let mut aad = [0u8; AAD_BYTES];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);
    OsRng.fill_bytes(&mut aad);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&iv);

    let mut tags = Vec::with_capacity(partitions.len());
    let mut ciphertexts = Vec::with_capacity(partitions.len());
    for (index, plaintext) in partitions.iter().enumerate() {
        let mut buf = plaintext.clone();
        let tag = cipher
            .encrypt_in_place_detached(nonce, &aad, &mut buf)
            .map_err(|_| CryptoError::EncryptionFailed { index })?;
        tags.push(tag.into());
        ciphertexts.push(buf);
    }

    Ok((EncryptionParameters { key, iv, aad, tags }, ciphertexts))
}

/// Authenticated decryption of one partition's ciphertext.
///
/// Fails closed: any tag or key mismatch yields
/// [`CryptoError::AuthenticationFailed`], never plaintext.
pub fn open_partition(
    params: &EncryptionParameters,
    index: usize,
    ciphertext: &[u8],
    tag: &[u8; TAG_BYTES],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&params.key));
    let nonce = Nonce::from_slice(&params.iv);

    let mut buf = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(nonce, &params.aad, &mut buf, Tag::from_slice(tag))
        .map_err(|_| CryptoError::AuthenticationFailed { index })?;
    Ok(buf)
}
