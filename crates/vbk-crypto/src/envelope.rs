//! Streaming hybrid envelope codec
//!
//! Envelope layout (binary):
//! ```text
//! [modulus_bytes: RSA-OAEP wrapped symmetric key]
//! repeat:
//!   [4 bytes: token length, big-endian u32][token: see `chunk`]
//! end-of-stream at a token boundary
//! ```
//!
//! Encryption reads at most `chunk_size` plaintext bytes at a time and writes
//! each token as soon as it is sealed; decryption holds at most one token.
//! An empty plaintext yields the key-wrap block and no tokens.

use std::io::{self, Read, Write};

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use crate::chunk::{decrypt_chunk, encrypt_chunk};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{generate_symmetric_key, unwrap_key, wrap_key};
use crate::TOKEN_OVERHEAD;

/// Default plaintext block size: 1 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest plaintext block size accepted by the codec: 64 MiB
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Largest token length a decoder will allocate for.
pub const MAX_TOKEN_LEN: usize = MAX_CHUNK_SIZE + TOKEN_OVERHEAD;

/// Size of the big-endian length prefix in front of every token.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// What one encrypt or decrypt call moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeSummary {
    pub chunks: u64,
    pub plaintext_bytes: u64,
    pub envelope_bytes: u64,
}

/// Envelope encryption engine. Holds no key material between calls.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    chunk_size: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EnvelopeCodec {
    pub fn new(chunk_size: usize) -> CryptoResult<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(CryptoError::InvalidConfig(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {chunk_size}"
            )));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encrypt `input` for the holder of `public_key`, writing the envelope to `output`.
    ///
    /// A fresh symmetric key is generated for every call and dropped (zeroized)
    /// when it returns. If this fails part-way, whatever reached `output` is
    /// not a usable envelope and must be discarded.
    pub fn encrypt<R: Read, W: Write>(
        &self,
        mut input: R,
        mut output: W,
        public_key: &RsaPublicKey,
    ) -> CryptoResult<EnvelopeSummary> {
        let key = generate_symmetric_key();
        let wrapped = wrap_key(public_key, &key)?;
        output.write_all(&wrapped)?;

        let mut summary = EnvelopeSummary {
            envelope_bytes: wrapped.len() as u64,
            ..Default::default()
        };

        let mut block = vec![0u8; self.chunk_size];
        loop {
            let filled = read_full(&mut input, &mut block)?;
            if filled == 0 {
                break;
            }

            let token = encrypt_chunk(&key, summary.chunks, &block[..filled])?;
            let len = u32::try_from(token.len()).map_err(|_| {
                CryptoError::Encrypt(format!("token of {} bytes exceeds u32 framing", token.len()))
            })?;
            output.write_all(&len.to_be_bytes())?;
            output.write_all(&token)?;

            summary.chunks += 1;
            summary.plaintext_bytes += filled as u64;
            summary.envelope_bytes += (LENGTH_PREFIX_SIZE + token.len()) as u64;

            if filled < block.len() {
                break;
            }
        }
        output.flush()?;

        debug!(
            chunks = summary.chunks,
            plaintext_bytes = summary.plaintext_bytes,
            envelope_bytes = summary.envelope_bytes,
            "envelope sealed"
        );
        Ok(summary)
    }

    /// Decrypt an envelope from `input` with `private_key`, writing plaintext to `output`.
    ///
    /// Plaintext is written one verified chunk at a time. On any error the
    /// bytes already written to `output` must be discarded: only an `Ok`
    /// return means the envelope ended cleanly at a chunk boundary and every
    /// chunk authenticated.
    pub fn decrypt<R: Read, W: Write>(
        &self,
        mut input: R,
        mut output: W,
        private_key: &RsaPrivateKey,
    ) -> CryptoResult<EnvelopeSummary> {
        let mut wrapped = vec![0u8; private_key.size()];
        let filled = read_full(&mut input, &mut wrapped)?;
        if filled < wrapped.len() {
            return Err(CryptoError::MalformedEnvelope(format!(
                "key-wrap block truncated: {filled} of {} bytes",
                wrapped.len()
            )));
        }
        let key = unwrap_key(private_key, &wrapped)?;

        let mut summary = EnvelopeSummary {
            envelope_bytes: wrapped.len() as u64,
            ..Default::default()
        };

        let mut token = Vec::new();
        while let Some(len) = read_length_prefix(&mut input)? {
            let len = len as usize;
            if len > MAX_TOKEN_LEN {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "chunk {}: token length {len} exceeds limit {MAX_TOKEN_LEN}",
                    summary.chunks
                )));
            }

            token.resize(len, 0);
            let filled = read_full(&mut input, &mut token)?;
            if filled < len {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "chunk {}: token truncated: {filled} of {len} bytes",
                    summary.chunks
                )));
            }

            let plaintext = decrypt_chunk(&key, summary.chunks, &token)?;
            output.write_all(&plaintext)?;

            summary.chunks += 1;
            summary.plaintext_bytes += plaintext.len() as u64;
            summary.envelope_bytes += (LENGTH_PREFIX_SIZE + len) as u64;
        }
        output.flush()?;

        debug!(
            chunks = summary.chunks,
            plaintext_bytes = summary.plaintext_bytes,
            "envelope opened"
        );
        Ok(summary)
    }
}

/// Read a token length prefix. `None` means a clean end-of-stream.
fn read_length_prefix<R: Read>(input: &mut R) -> CryptoResult<Option<u32>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match read_full(input, &mut prefix)? {
        0 => Ok(None),
        LENGTH_PREFIX_SIZE => Ok(Some(u32::from_be_bytes(prefix))),
        n => Err(CryptoError::MalformedEnvelope(format!(
            "length prefix truncated: {n} of {LENGTH_PREFIX_SIZE} bytes"
        ))),
    }
}

/// Fill `buf` from `input`, stopping early only at end-of-stream.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
