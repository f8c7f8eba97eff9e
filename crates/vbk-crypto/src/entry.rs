//! Bounded-retry private key entry
//!
//! A private key obtained from an operator is only handed out once it has
//! been decoded and confirmed against the certificate's public key, so the
//! envelope decoder never runs with a key that cannot be the right one.
//!
//! ```text
//! Prompting(n) ──material──▶ Validating(n) ──match──▶ Verified
//!      ▲                          │
//!      └──── decode fail / mismatch (n < max) ─┘
//!                                 │ (n == max)
//!                                 ▼
//!                             Exhausted
//! ```

use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use tracing::{info, warn};

use crate::certificate::KeyPairProvider;
use crate::error::{CryptoError, CryptoResult};
use crate::verify::matches;

/// Default number of attempts an operator gets.
pub const DEFAULT_KEY_ENTRY_ATTEMPTS: u32 = 3;

/// What an operator supplied on one attempt.
pub struct KeyMaterial {
    /// PEM-encoded private key
    pub key_pem: SecretString,
    /// Password for an encrypted key; `None` or empty means unencrypted
    pub password: Option<SecretString>,
}

/// Source of operator-supplied key material (terminal, key file, test script).
pub trait KeyPrompt {
    /// Ask for key material. `attempt` counts from 1.
    ///
    /// An error here (closed stdin, unreadable key file) aborts the entry.
    fn request(&mut self, attempt: u32, max_attempts: u32) -> CryptoResult<KeyMaterial>;
}

/// States of one key entry session.
enum EntryState {
    Prompting { attempt: u32 },
    Validating { attempt: u32, material: KeyMaterial },
    Verified(RsaPrivateKey),
    Exhausted,
}

/// Drives the prompt → decode → confirm loop against a known public key.
pub struct KeyEntry<'a> {
    provider: &'a KeyPairProvider,
    expected: &'a RsaPublicKey,
    max_attempts: u32,
}

impl<'a> KeyEntry<'a> {
    pub fn new(
        provider: &'a KeyPairProvider,
        expected: &'a RsaPublicKey,
        max_attempts: u32,
    ) -> CryptoResult<Self> {
        if max_attempts == 0 {
            return Err(CryptoError::InvalidConfig(
                "key entry needs at least one attempt".into(),
            ));
        }
        Ok(Self {
            provider,
            expected,
            max_attempts,
        })
    }

    /// Run the session until a matching key is verified or attempts run out.
    pub fn run<P: KeyPrompt + ?Sized>(&self, prompt: &mut P) -> CryptoResult<RsaPrivateKey> {
        let mut state = EntryState::Prompting { attempt: 1 };
        loop {
            state = match state {
                EntryState::Prompting { attempt } => {
                    let material = prompt.request(attempt, self.max_attempts)?;
                    EntryState::Validating { attempt, material }
                }
                EntryState::Validating { attempt, material } => self.validate(attempt, material),
                EntryState::Verified(key) => {
                    info!("private key matches certificate");
                    return Ok(key);
                }
                EntryState::Exhausted => {
                    return Err(CryptoError::KeyEntryExhausted {
                        attempts: self.max_attempts,
                    });
                }
            };
        }
    }

    fn validate(&self, attempt: u32, material: KeyMaterial) -> EntryState {
        use secrecy::ExposeSecret;

        let loaded = self.provider.load_private_key(
            material.key_pem.expose_secret().as_bytes(),
            material.password.as_ref(),
        );

        match loaded {
            Ok(key) if matches(&key, self.expected) => return EntryState::Verified(key),
            Ok(_) => warn!(
                attempt,
                max_attempts = self.max_attempts,
                "private key does not belong to the certificate"
            ),
            Err(e) => warn!(
                attempt,
                max_attempts = self.max_attempts,
                error = %e,
                "failed to load private key"
            ),
        }

        if attempt >= self.max_attempts {
            EntryState::Exhausted
        } else {
            EntryState::Prompting {
                attempt: attempt + 1,
            }
        }
    }
}
