use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VbkError, VbkResult};

/// Top-level configuration (loaded from volume-backup.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VbkConfig {
    pub paths: PathsConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub archive: ArchiveConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory backed up / restored into (default: /data)
    pub data_dir: PathBuf,
    /// Directory holding cert.pem and key.pem (default: /config)
    pub config_dir: PathBuf,
    /// Scratch space for archives and envelopes (default: /tmp)
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 endpoint; empty means the provider default
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

/// Envelope and key parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Plaintext bytes per envelope chunk (default: 1 MiB)
    pub chunk_size: usize,
    /// RSA modulus size for `gencert` (default: 4096)
    pub rsa_key_bits: usize,
    /// Attempts an operator gets to supply the private key (default: 3)
    pub key_entry_attempts: u32,
    /// PBKDF2 iterations protecting an encrypted private key (default: 600000)
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStrategy {
    /// Use the system `tar` if it supports zstd, else the built-in one
    Auto,
    System,
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub strategy: ArchiveStrategy,
    /// zstd compression level (default: 3)
    pub zstd_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            config_dir: PathBuf::from("/config"),
            work_dir: PathBuf::from("/tmp"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".into(),
            enforce_tls: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            chunk_size: vbk_crypto::envelope::DEFAULT_CHUNK_SIZE,
            rsa_key_bits: vbk_crypto::certificate::DEFAULT_RSA_KEY_BITS,
            key_entry_attempts: vbk_crypto::entry::DEFAULT_KEY_ENTRY_ATTEMPTS,
            pbkdf2_iterations: vbk_crypto::certificate::DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            strategy: ArchiveStrategy::Auto,
            zstd_level: 3,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl PathsConfig {
    /// Self-signed certificate used for encryption
    pub fn certificate(&self) -> PathBuf {
        self.config_dir.join("cert.pem")
    }

    /// Default private key location written by `gencert`
    pub fn private_key(&self) -> PathBuf {
        self.config_dir.join("key.pem")
    }
}

impl CryptoConfig {
    pub fn key_params(&self) -> vbk_crypto::KeyParams {
        vbk_crypto::KeyParams {
            rsa_bits: self.rsa_key_bits,
            pbkdf2_iterations: self.pbkdf2_iterations,
        }
    }
}

impl VbkConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> VbkResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VbkError::Config(format!("reading config {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| VbkError::Config(format!("parsing config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
