//! File-level wrappers around the envelope codec
//!
//! Output is staged in a temporary file next to the destination and only
//! renamed into place once the codec returned `Ok`, so neither a cancelled
//! encryption nor a rejected decryption leaves a file that looks complete.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::NamedTempFile;
use tracing::info;

use crate::envelope::{EnvelopeCodec, EnvelopeSummary};
use crate::error::CryptoResult;

/// Suffix appended to an encrypted file's name.
pub const ENCRYPTED_SUFFIX: &str = ".crypt";

/// Suffix appended when an encrypted file's name has no `.crypt` to strip.
pub const DECRYPTED_SUFFIX: &str = ".decrypt";

/// `backup.tar.zst` → `backup.tar.zst.crypt`
pub fn encrypted_path(plain: &Path) -> PathBuf {
    let mut name = plain.as_os_str().to_owned();
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// `backup.tar.zst.crypt` → `backup.tar.zst`, anything else → `<name>.decrypt`
pub fn decrypted_path(encrypted: &Path) -> PathBuf {
    let name = encrypted.file_name().map(|n| n.to_string_lossy().into_owned());
    match name.as_deref().and_then(|n| n.strip_suffix(ENCRYPTED_SUFFIX)) {
        Some(stem) if !stem.is_empty() => encrypted.with_file_name(stem),
        _ => {
            let mut name = OsString::from(encrypted.as_os_str());
            name.push(DECRYPTED_SUFFIX);
            PathBuf::from(name)
        }
    }
}

/// Encrypt `src` into `src.crypt`. Refuses to overwrite an existing file.
pub fn encrypt_file(
    codec: &EnvelopeCodec,
    src: &Path,
    public_key: &RsaPublicKey,
) -> CryptoResult<(PathBuf, EnvelopeSummary)> {
    let dst = encrypted_path(src);
    refuse_existing(&dst)?;

    let input = BufReader::new(File::open(src)?);
    let staged = staging_file(&dst)?;
    let summary = codec.encrypt(input, BufWriter::new(staged.as_file()), public_key)?;
    persist(staged, &dst)?;

    info!(
        src = %src.display(),
        dst = %dst.display(),
        chunks = summary.chunks,
        "encrypted file"
    );
    Ok((dst, summary))
}

/// Decrypt `src` into `dst` (default: `decrypted_path(src)`).
///
/// Refuses to overwrite an existing file. Nothing appears at `dst` unless the
/// whole envelope verified.
pub fn decrypt_file(
    codec: &EnvelopeCodec,
    src: &Path,
    dst: Option<&Path>,
    private_key: &RsaPrivateKey,
) -> CryptoResult<(PathBuf, EnvelopeSummary)> {
    let dst = dst.map(Path::to_path_buf).unwrap_or_else(|| decrypted_path(src));
    refuse_existing(&dst)?;

    let input = BufReader::new(File::open(src)?);
    let staged = staging_file(&dst)?;
    // on error `staged` is dropped and the partial plaintext deleted
    let summary = codec.decrypt(input, BufWriter::new(staged.as_file()), private_key)?;
    persist(staged, &dst)?;

    info!(
        src = %src.display(),
        dst = %dst.display(),
        bytes = summary.plaintext_bytes,
        "decrypted file"
    );
    Ok((dst, summary))
}

fn refuse_existing(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("output file '{}' already exists", path.display()),
        ));
    }
    Ok(())
}

fn staging_file(dst: &Path) -> io::Result<NamedTempFile> {
    let dir = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new().prefix(".vbk-").tempfile_in(dir)
}

fn persist(staged: NamedTempFile, dst: &Path) -> io::Result<()> {
    staged.as_file().sync_all()?;
    staged.persist_noclobber(dst).map_err(|e| e.error)?;
    Ok(())
}
