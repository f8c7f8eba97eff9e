//! Key-pair confirmation without touching any ciphertext

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// True iff `candidate` is the private half of `expected`.
///
/// Compares the numeric modulus and public exponent of the public key derived
/// from `candidate`; encodings are never compared.
pub fn matches(candidate: &RsaPrivateKey, expected: &RsaPublicKey) -> bool {
    let derived = candidate.to_public_key();
    derived.n() == expected.n() && derived.e() == expected.e()
}
