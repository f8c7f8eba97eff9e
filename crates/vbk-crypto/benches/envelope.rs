use std::sync::OnceLock;

use vbk_crypto::{EnvelopeCodec, RsaPrivateKey, RsaPublicKey};

fn key_pair() -> &'static (RsaPrivateKey, RsaPublicKey) {
    static PAIR: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
    PAIR.get_or_init(|| {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public_key = private_key.to_public_key();
        (private_key, public_key)
    })
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let (_, public_key) = key_pair();
    let codec = EnvelopeCodec::default();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + 4096);
            codec
                .encrypt(divan::black_box(&data[..]), &mut out, public_key)
                .unwrap();
            out
        });
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let (private_key, public_key) = key_pair();
    let codec = EnvelopeCodec::default();
    let data = make_data(size);
    let mut envelope = Vec::new();
    codec.encrypt(&data[..], &mut envelope, public_key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            codec
                .decrypt(divan::black_box(&envelope[..]), &mut out, private_key)
                .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
