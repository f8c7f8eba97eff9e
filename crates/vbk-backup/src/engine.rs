use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;
use tracing::{info, warn};

use vbk_archive::Archiver;
use vbk_core::config::PathsConfig;
use vbk_core::fs::{ensure_unique, is_dir_empty};
use vbk_core::{VbkError, VbkResult};
use vbk_crypto::{EnvelopeCodec, EnvelopeSummary, KeyPairProvider, RsaPrivateKey, RsaPublicKey};

const ARCHIVE_NAME: &str = "volume.tar.zst";
const DOWNLOAD_NAME: &str = "volume.tar.zst.crypt";

/// Result of one backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub name: String,
    pub archive_bytes: u64,
    pub envelope: EnvelopeSummary,
    pub uploaded_bytes: u64,
}

/// Result of one restore run
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub name: String,
    pub downloaded_bytes: u64,
    pub envelope: EnvelopeSummary,
}

/// Where `gencert` put the key pair
#[derive(Debug, Clone)]
pub struct GeneratedFiles {
    pub private_key: PathBuf,
    pub certificate: PathBuf,
}

/// Archive `paths.data_dir`, encrypt it for `public_key`, and upload it as `name`.
///
/// Fails with a precondition error when the data directory is missing or empty.
pub async fn backup(
    op: &Operator,
    paths: &PathsConfig,
    public_key: &RsaPublicKey,
    codec: &EnvelopeCodec,
    archiver: Arc<dyn Archiver>,
    name: &str,
) -> VbkResult<BackupReport> {
    if is_dir_empty(&paths.data_dir)? {
        return Err(VbkError::Precondition(format!(
            "{} is empty, nothing to back up",
            paths.data_dir.display()
        )));
    }
    check_bucket(op).await?;

    let scratch = scratch_dir(&paths.work_dir, "vbk-backup-")?;
    let archive = scratch.path().join(ARCHIVE_NAME);

    info!(src = %paths.data_dir.display(), archiver = archiver.name(), "packing");
    let data_dir = paths.data_dir.clone();
    let archive_path = archive.clone();
    blocking(move || {
        archiver
            .pack(&data_dir, &archive_path)
            .map_err(|e| VbkError::Archive(format!("{e:#}")))
    })
    .await?;
    let archive_bytes = std::fs::metadata(&archive)?.len();

    info!(bytes = archive_bytes, "encrypting");
    let codec = codec.clone();
    let key = public_key.clone();
    let (envelope_path, envelope) = blocking(move || {
        vbk_crypto::encrypt_file(&codec, &archive, &key).map_err(VbkError::from)
    })
    .await?;

    let uploaded_bytes = vbk_storage::put(op, &envelope_path, name)
        .await
        .map_err(|e| VbkError::Storage(format!("{e:#}")))?;

    close_scratch(scratch);
    info!(name, uploaded_bytes, chunks = envelope.chunks, "backup complete");
    Ok(BackupReport {
        name: name.to_string(),
        archive_bytes,
        envelope,
        uploaded_bytes,
    })
}

/// Download `name`, decrypt it with `private_key`, and unpack it into `paths.data_dir`.
///
/// Fails with a precondition error unless the data directory exists and is empty.
/// `private_key` must already be confirmed against the certificate.
pub async fn restore(
    op: &Operator,
    paths: &PathsConfig,
    private_key: &RsaPrivateKey,
    codec: &EnvelopeCodec,
    archiver: Arc<dyn Archiver>,
    name: &str,
) -> VbkResult<RestoreReport> {
    if !is_dir_empty(&paths.data_dir)? {
        return Err(VbkError::Precondition(format!(
            "{} is not empty, refusing to restore over existing data",
            paths.data_dir.display()
        )));
    }
    check_bucket(op).await?;

    let scratch = scratch_dir(&paths.work_dir, "vbk-restore-")?;
    let download = scratch.path().join(DOWNLOAD_NAME);

    let downloaded_bytes = vbk_storage::get(op, name, &download)
        .await
        .map_err(|e| VbkError::Storage(format!("{e:#}")))?;

    info!(bytes = downloaded_bytes, "decrypting");
    let codec = codec.clone();
    let key = private_key.clone();
    let (archive, envelope) = blocking(move || {
        vbk_crypto::decrypt_file(&codec, &download, None, &key).map_err(VbkError::from)
    })
    .await?;

    info!(dest = %paths.data_dir.display(), archiver = archiver.name(), "unpacking");
    let data_dir = paths.data_dir.clone();
    blocking(move || {
        archiver
            .unpack(&archive, &data_dir)
            .map_err(|e| VbkError::Archive(format!("{e:#}")))
    })
    .await?;

    close_scratch(scratch);
    info!(name, plaintext_bytes = envelope.plaintext_bytes, "restore complete");
    Ok(RestoreReport {
        name: name.to_string(),
        downloaded_bytes,
        envelope,
    })
}

/// Generate a key pair and write `key.pem` / `cert.pem` into `config_dir`.
///
/// Existing files are never overwritten: the first free `key.pem_N` /
/// `cert.pem_N` is used instead. The private key is written owner-only.
pub fn gencert(
    config_dir: &Path,
    provider: &KeyPairProvider,
    password: Option<&SecretString>,
) -> VbkResult<GeneratedFiles> {
    if !config_dir.is_dir() {
        return Err(VbkError::Precondition(format!(
            "config directory {} does not exist",
            config_dir.display()
        )));
    }

    let pair = provider.generate(password)?;

    let private_key = ensure_unique(&config_dir.join("key.pem"));
    write_new(&private_key, pair.private_key_pem.as_bytes(), 0o600)?;
    let certificate = ensure_unique(&config_dir.join("cert.pem"));
    write_new(&certificate, pair.certificate_pem.as_bytes(), 0o644)?;

    for (path, default) in [(&private_key, "key.pem"), (&certificate, "cert.pem")] {
        if path.file_name().is_some_and(|n| n != default) {
            warn!(
                "{default} already exists, wrote {} instead; rename it before use",
                path.display()
            );
        }
    }
    info!(
        key = %private_key.display(),
        cert = %certificate.display(),
        encrypted = password.is_some_and(|p| !p.expose_secret().is_empty()),
        "key pair generated"
    );
    Ok(GeneratedFiles {
        private_key,
        certificate,
    })
}

async fn check_bucket(op: &Operator) -> VbkResult<()> {
    vbk_storage::check_bucket(op)
        .await
        .map_err(|e| VbkError::Storage(format!("{e:#}")))
}

fn scratch_dir(work_dir: &Path, prefix: &str) -> VbkResult<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(work_dir)
        .map_err(|e| {
            VbkError::Precondition(format!(
                "cannot create scratch space in {}: {e}",
                work_dir.display()
            ))
        })
}

fn close_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!("removing scratch directory {}: {e}", path.display());
    }
}

async fn blocking<T, F>(f: F) -> VbkResult<T>
where
    F: FnOnce() -> VbkResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VbkError::Other(anyhow::anyhow!("worker task failed: {e}")))?
}

fn write_new(path: &Path, contents: &[u8], mode: u32) -> VbkResult<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbk_crypto::KeyParams;

    fn provider() -> KeyPairProvider {
        KeyPairProvider::new(KeyParams {
            rsa_bits: 2048,
            pbkdf2_iterations: 1_000,
        })
        .unwrap()
    }

    #[test]
    fn test_gencert_writes_pair() {
        let tmp = tempfile::TempDir::new().unwrap();
        let provider = provider();
        let files = gencert(tmp.path(), &provider, None).unwrap();

        assert_eq!(files.private_key, tmp.path().join("key.pem"));
        assert_eq!(files.certificate, tmp.path().join("cert.pem"));

        let cert = std::fs::read(&files.certificate).unwrap();
        let key = std::fs::read(&files.private_key).unwrap();
        let public_key = provider.load_public_key(&cert).unwrap();
        let private_key = provider.load_private_key(&key, None).unwrap();
        assert!(vbk_crypto::matches(&private_key, &public_key));
    }

    #[cfg(unix)]
    #[test]
    fn test_gencert_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let files = gencert(tmp.path(), &provider(), None).unwrap();
        let mode = std::fs::metadata(&files.private_key)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0, "key.pem must not be group/world accessible");
    }

    #[test]
    fn test_gencert_never_overwrites() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("key.pem"), b"old key").unwrap();
        std::fs::write(tmp.path().join("cert.pem"), b"old cert").unwrap();

        let files = gencert(tmp.path(), &provider(), None).unwrap();

        assert_eq!(files.private_key, tmp.path().join("key.pem_0"));
        assert_eq!(files.certificate, tmp.path().join("cert.pem_0"));
        assert_eq!(std::fs::read(tmp.path().join("key.pem")).unwrap(), b"old key");
        assert_eq!(std::fs::read(tmp.path().join("cert.pem")).unwrap(), b"old cert");
    }

    #[test]
    fn test_gencert_with_password() {
        let tmp = tempfile::TempDir::new().unwrap();
        let provider = provider();
        let password = SecretString::from("secret");
        let files = gencert(tmp.path(), &provider, Some(&password)).unwrap();

        let key = std::fs::read(&files.private_key).unwrap();
        assert!(String::from_utf8_lossy(&key).contains("ENCRYPTED PRIVATE KEY"));
        assert!(provider.load_private_key(&key, Some(&password)).is_ok());
        assert!(provider.load_private_key(&key, None).is_err());
    }

    #[test]
    fn test_gencert_missing_config_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = gencert(&tmp.path().join("absent"), &provider(), None);
        assert!(matches!(result, Err(VbkError::Precondition(_))));
    }
}
