//! Symmetric envelope key: generation, and wrapping under an RSA public key
//!
//! Wrapped key format: one RSA-OAEP block (MGF1-SHA256, SHA-256 label hash,
//! empty label), exactly `modulus_bytes` long.

use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// A per-envelope 256-bit symmetric key. Zeroized on drop.
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit symmetric key.
pub fn generate_symmetric_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes)
}

/// Length in bytes of the key-wrap block produced for `public_key`.
pub fn wrapped_key_len(public_key: &RsaPublicKey) -> usize {
    public_key.size()
}

/// Wrap (encrypt) a symmetric key under an RSA public key with OAEP-SHA256.
pub fn wrap_key(public_key: &RsaPublicKey, key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    public_key
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            key.as_bytes(),
        )
        .map_err(|e| CryptoError::Encrypt(format!("RSA-OAEP key wrap: {e}")))
}

/// Unwrap (decrypt) a symmetric key with the matching RSA private key.
///
/// Input must be exactly one key-wrap block (output of `wrap_key`).
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> CryptoResult<SymmetricKey> {
    if wrapped.len() != private_key.size() {
        return Err(CryptoError::KeyUnwrap(format!(
            "key-wrap block is {} bytes, private key expects {}",
            wrapped.len(),
            private_key.size()
        )));
    }

    let mut plaintext = private_key
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| {
            CryptoError::KeyUnwrap("RSA-OAEP decryption failed: wrong private key or corrupt block".into())
        })?;

    if plaintext.len() != KEY_SIZE {
        let len = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::KeyUnwrap(format!(
            "unwrapped key has wrong size: {len} bytes (expected {KEY_SIZE})"
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(SymmetricKey::from_bytes(key_bytes))
}
