//! Streaming upload and download between local files and the bucket

use std::path::Path;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use opendal::Operator;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upload part size; also the read buffer size for local files
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Upload `local_path` as object `remote_name`, streaming in [`PART_SIZE`] parts.
///
/// Returns the number of bytes uploaded.
pub async fn put(op: &Operator, local_path: &Path, remote_name: &str) -> Result<u64> {
    let mut file = tokio::fs::File::open(local_path)
        .await
        .with_context(|| format!("opening {}", local_path.display()))?;

    let mut writer = op
        .writer_with(remote_name)
        .chunk(PART_SIZE)
        .await
        .with_context(|| format!("starting upload of {remote_name}"))?;

    let total = match upload_parts(&mut file, &mut writer).await {
        Ok(total) => total,
        Err(e) => {
            if let Err(abort) = writer.abort().await {
                tracing::warn!("aborting upload of {remote_name}: {abort}");
            }
            return Err(e).with_context(|| {
                format!("uploading {} as {remote_name}", local_path.display())
            });
        }
    };
    writer
        .close()
        .await
        .with_context(|| format!("finishing upload of {remote_name}"))?;

    tracing::info!(object = remote_name, bytes = total, "uploaded");
    Ok(total)
}

// Any error here leaves a started multipart upload that the caller must abort.
async fn upload_parts(file: &mut tokio::fs::File, writer: &mut opendal::Writer) -> Result<u64> {
    let mut buf = vec![0u8; PART_SIZE];
    let mut total = 0u64;
    loop {
        let n = read_part(file, &mut buf).await.context("reading local file")?;
        if n == 0 {
            return Ok(total);
        }
        writer
            .write(buf[..n].to_vec())
            .await
            .with_context(|| format!("writing part at offset {total}"))?;
        total += n as u64;
    }
}

/// Download object `remote_name` to `local_path`.
///
/// Refuses to overwrite an existing file. A failed download removes the
/// partial file. Returns the number of bytes written.
pub async fn get(op: &Operator, remote_name: &str, local_path: &Path) -> Result<u64> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(local_path)
        .await
        .with_context(|| format!("creating {}", local_path.display()))?;

    match download_into(op, remote_name, &mut file).await {
        Ok(total) => {
            tracing::info!(object = remote_name, bytes = total, "downloaded");
            Ok(total)
        }
        Err(e) => {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(local_path).await {
                tracing::warn!("removing partial download {}: {rm}", local_path.display());
            }
            Err(e)
        }
    }
}

async fn download_into(op: &Operator, remote_name: &str, file: &mut tokio::fs::File) -> Result<u64> {
    let reader = op
        .reader(remote_name)
        .await
        .with_context(|| format!("opening object {remote_name}"))?;
    let mut stream = reader
        .into_bytes_stream(..)
        .await
        .with_context(|| format!("streaming object {remote_name}"))?;

    let mut total = 0u64;
    while let Some(bytes) = stream
        .try_next()
        .await
        .with_context(|| format!("downloading {remote_name}"))?
    {
        file.write_all(&bytes).await.context("writing download")?;
        total += bytes.len() as u64;
    }
    file.flush().await.context("flushing download")?;
    file.sync_all().await.context("syncing download")?;
    Ok(total)
}

// Fill `buf` as far as the file allows; short only at EOF.
async fn read_part(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let op = memory_operator();
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("envelope.crypt");
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        assert_eq!(put(&op, &src, "nightly").await.unwrap(), data.len() as u64);
        assert_eq!(
            op.stat("nightly").await.unwrap().content_length(),
            data.len() as u64
        );

        let dest = tmp.path().join("download");
        assert_eq!(get(&op, "nightly", &dest).await.unwrap(), data.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn test_put_empty_file() {
        let op = memory_operator();
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("empty");
        std::fs::write(&src, b"").unwrap();

        assert_eq!(put(&op, &src, "empty").await.unwrap(), 0);
        assert_eq!(op.read("empty").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_put_missing_local_file() {
        let op = memory_operator();
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(put(&op, &tmp.path().join("absent"), "x").await.is_err());
    }

    #[tokio::test]
    async fn test_put_failure_leaves_no_object() {
        let op = memory_operator();
        let tmp = tempfile::TempDir::new().unwrap();
        // opens fine, fails on the first read
        let src = tmp.path().join("not-a-file");
        std::fs::create_dir(&src).unwrap();

        let err = put(&op, &src, "nightly").await.unwrap_err();
        assert!(format!("{err:#}").contains("nightly"));
        assert!(!op.exists("nightly").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_refuses_overwrite() {
        let op = memory_operator();
        op.write("obj", b"remote".to_vec()).await.unwrap();

        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("existing");
        std::fs::write(&dest, b"local").unwrap();

        assert!(get(&op, "obj", &dest).await.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_get_missing_object_leaves_no_file() {
        let op = memory_operator();
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("download");

        let err = get(&op, "does-not-exist", &dest).await.unwrap_err();
        assert!(format!("{err:#}").contains("does-not-exist"));
        assert!(!dest.exists(), "partial download must be removed");
    }
}
