//! vbk-crypto: hybrid envelope encryption for volume backups
//!
//! Architecture: RSA-OAEP key wrap + chunked XChaCha20-Poly1305
//!
//! ```text
//! encrypt: fresh 256-bit key ──RSA-OAEP(SHA-256)──▶ key-wrap block (modulus bytes)
//!          plaintext ──1 MiB blocks──▶ XChaCha20-Poly1305 (AAD = chunk index) ──▶ [u32 BE len][token]*
//!
//! decrypt: key-wrap block ──RSA-OAEP──▶ key ──▶ verify + decrypt tokens in order
//! ```
//!
//! Private keys are only trusted after `verify::matches` confirms them against
//! the certificate's public key; `entry::KeyEntry` enforces that for
//! operator-supplied keys.

pub mod certificate;
pub mod chunk;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod file;
pub mod keys;
pub mod verify;

pub use certificate::{GeneratedKeyPair, KeyPairProvider, KeyParams};
pub use entry::{KeyEntry, KeyMaterial, KeyPrompt};
pub use envelope::{EnvelopeCodec, EnvelopeSummary};
pub use error::{CryptoError, CryptoResult};
pub use file::{decrypt_file, decrypted_path, encrypt_file, encrypted_path};
pub use keys::{generate_symmetric_key, SymmetricKey};
pub use verify::matches;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Size of a symmetric envelope key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes a token adds on top of its plaintext (nonce + tag)
pub const TOKEN_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use rand::RngCore;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    use crate::certificate::{KeyPairProvider, KeyParams};

    fn generate() -> (RsaPrivateKey, RsaPublicKey) {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public_key = private_key.to_public_key();
        (private_key, public_key)
    }

    /// One 2048-bit pair per test binary; generation dominates test time.
    pub fn shared_key_pair() -> (&'static RsaPrivateKey, &'static RsaPublicKey) {
        static PAIR: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
        let (private_key, public_key) = PAIR.get_or_init(generate);
        (private_key, public_key)
    }

    /// A second, independent pair for wrong-key tests.
    pub fn second_key_pair() -> (&'static RsaPrivateKey, &'static RsaPublicKey) {
        static PAIR: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
        let (private_key, public_key) = PAIR.get_or_init(generate);
        (private_key, public_key)
    }

    /// Provider with test-sized keys and a cheap KDF.
    pub fn test_provider() -> KeyPairProvider {
        KeyPairProvider::new(KeyParams {
            rsa_bits: 2048,
            pbkdf2_iterations: 1_000,
        })
        .unwrap()
    }

    pub fn random_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }
}
