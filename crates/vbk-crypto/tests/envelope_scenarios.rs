//! End-to-end scenarios through the public API: generate a certificate, load
//! both halves from PEM, seal and open envelopes.

use rand::RngCore;
use secrecy::SecretString;
use vbk_crypto::{
    matches, CryptoError, EnvelopeCodec, KeyPairProvider, KeyParams,
};

fn provider(bits: usize) -> KeyPairProvider {
    KeyPairProvider::new(KeyParams {
        rsa_bits: bits,
        pbkdf2_iterations: 1_000,
    })
    .expect("valid key params")
}

fn payload(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[test]
fn password_protected_pair_roundtrip() {
    let provider = provider(2048);
    let password = SecretString::from("secret");
    let pair = provider.generate(Some(&password)).unwrap();

    let public_key = provider.load_public_key(pair.certificate_pem.as_bytes()).unwrap();
    let original = payload(5000);

    let mut envelope = Vec::new();
    EnvelopeCodec::default()
        .encrypt(&original[..], &mut envelope, &public_key)
        .unwrap();

    let private_key = provider
        .load_private_key(pair.private_key_pem.as_bytes(), Some(&password))
        .unwrap();
    assert!(matches(&private_key, &public_key));

    let mut restored = Vec::new();
    EnvelopeCodec::default()
        .decrypt(&envelope[..], &mut restored, &private_key)
        .unwrap();
    assert_eq!(restored, original);

    for wrong in ["Secret", "secret ", "hunter2"] {
        let result = provider.load_private_key(
            pair.private_key_pem.as_bytes(),
            Some(&SecretString::from(wrong)),
        );
        assert!(
            matches!(result, Err(CryptoError::Decode(_))),
            "password {wrong:?} must not decrypt the key"
        );
    }
}

#[test]
fn envelope_for_one_pair_rejected_by_another() {
    let provider = provider(2048);
    let first = provider.generate(None).unwrap();
    let second = provider.generate(None).unwrap();

    let public_key = provider.load_public_key(first.certificate_pem.as_bytes()).unwrap();
    let other_private = provider
        .load_private_key(second.private_key_pem.as_bytes(), None)
        .unwrap();
    assert!(!matches(&other_private, &public_key));

    let mut envelope = Vec::new();
    EnvelopeCodec::default()
        .encrypt(&payload(5000)[..], &mut envelope, &public_key)
        .unwrap();

    let mut restored = Vec::new();
    let result = EnvelopeCodec::default().decrypt(&envelope[..], &mut restored, &other_private);
    assert!(matches!(result, Err(CryptoError::KeyUnwrap(_))));
    assert!(restored.is_empty());
}

#[test]
#[ignore = "4096-bit key generation is slow; run with --ignored"]
fn default_key_size_layout() {
    let provider = KeyPairProvider::new(KeyParams::default()).unwrap();
    let pair = provider.generate(None).unwrap();
    let public_key = provider.load_public_key(pair.certificate_pem.as_bytes()).unwrap();
    let private_key = provider
        .load_private_key(pair.private_key_pem.as_bytes(), None)
        .unwrap();

    let mut envelope = Vec::new();
    EnvelopeCodec::default()
        .encrypt(&b""[..], &mut envelope, &public_key)
        .unwrap();
    assert_eq!(envelope.len(), 512, "4096-bit key-wrap block is 512 bytes");

    let mut restored = Vec::new();
    EnvelopeCodec::default()
        .decrypt(&envelope[..], &mut restored, &private_key)
        .unwrap();
    assert!(restored.is_empty());
}
