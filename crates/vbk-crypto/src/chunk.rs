//! Per-chunk XChaCha20-Poly1305 tokens
//!
//! Token format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = chunk_index (8 bytes, big-endian)
//! ```
//!
//! The AAD binds each token to its position in the envelope, so a token that
//! is moved, duplicated, or dropped from the middle fails authentication.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::{NONCE_SIZE, TAG_SIZE, TOKEN_OVERHEAD};

/// Encrypt one plaintext block into a self-contained token.
///
/// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt_chunk(key: &SymmetricKey, chunk_index: u64, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let aad = chunk_index.to_be_bytes();

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::Encrypt(format!("chunk {chunk_index}: {e}")))?;

    let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    token.extend_from_slice(&nonce_bytes);
    token.extend_from_slice(&ciphertext);
    Ok(token)
}

/// Authenticate and decrypt one token produced by `encrypt_chunk`.
pub fn decrypt_chunk(key: &SymmetricKey, chunk_index: u64, token: &[u8]) -> CryptoResult<Vec<u8>> {
    if token.len() < TOKEN_OVERHEAD {
        return Err(CryptoError::TamperedData(format!(
            "chunk {chunk_index}: token too short: {} bytes (minimum {})",
            token.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce_bytes, ciphertext) = token.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let aad = chunk_index.to_be_bytes();

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| {
            CryptoError::TamperedData(format!(
                "chunk {chunk_index}: authentication failed (corrupted, reordered, or wrong key)"
            ))
        })
}
