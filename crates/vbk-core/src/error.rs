use thiserror::Error;
use vbk_crypto::CryptoError;

pub type VbkResult<T> = Result<T, VbkError>;

#[derive(Debug, Error)]
pub enum VbkError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VbkError {
    /// Error category reported to the operator.
    pub fn category(&self) -> &'static str {
        match self {
            VbkError::Precondition(_) => "PreconditionError",
            VbkError::Config(_) => "ConfigError",
            VbkError::Archive(_) => "ArchiveError",
            VbkError::Storage(_) => "StorageError",
            VbkError::Crypto(e) => e.category(),
            VbkError::Io(_) => "IoError",
            VbkError::Other(_) => "Error",
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            VbkError::Precondition(_) => 2,
            VbkError::Crypto(
                CryptoError::UnsupportedKeyType(_)
                | CryptoError::Decode(_)
                | CryptoError::KeyEntryExhausted { .. },
            ) => 3,
            VbkError::Crypto(
                CryptoError::KeyUnwrap(_)
                | CryptoError::MalformedEnvelope(_)
                | CryptoError::TamperedData(_),
            ) => 4,
            _ => 1,
        }
    }
}
