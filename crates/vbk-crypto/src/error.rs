use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failure categories of the key handling and envelope codec.
///
/// Every variant is fatal to the operation that produced it. Callers match on
/// the variant rather than on message text.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key or certificate holds something other than an RSA key.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Key or certificate bytes could not be parsed or decrypted.
    #[error("decode error: {0}")]
    Decode(String),

    /// The wrapped symmetric key could not be recovered with the private key.
    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    /// Framing violation: truncated prefix or token body, oversized token.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A chunk token failed authentication.
    #[error("tampered data: {0}")]
    TamperedData(String),

    /// The operator did not supply a matching private key in time.
    #[error("no matching private key after {attempts} attempt(s)")]
    KeyEntryExhausted { attempts: u32 },

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("invalid crypto configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Stable category name used in user-facing reports.
    pub fn category(&self) -> &'static str {
        match self {
            CryptoError::UnsupportedKeyType(_) => "UnsupportedKeyType",
            CryptoError::Decode(_) => "DecodeError",
            CryptoError::KeyUnwrap(_) => "KeyUnwrapError",
            CryptoError::MalformedEnvelope(_) => "MalformedEnvelopeError",
            CryptoError::TamperedData(_) => "TamperedDataError",
            CryptoError::KeyEntryExhausted { .. } => "KeyEntryExhaustedError",
            CryptoError::Encrypt(_) => "EncryptError",
            CryptoError::InvalidConfig(_) => "ConfigError",
            CryptoError::Io(_) => "IoError",
        }
    }
}
