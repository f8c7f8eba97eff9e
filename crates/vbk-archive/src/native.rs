//! In-process tar + zstd strategy

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::{Archiver, DEFAULT_ZSTD_LEVEL};

#[derive(Debug, Clone)]
pub struct NativeTar {
    level: i32,
}

impl NativeTar {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for NativeTar {
    fn default() -> Self {
        Self::new(DEFAULT_ZSTD_LEVEL)
    }
}

impl Archiver for NativeTar {
    fn name(&self) -> &'static str {
        "native"
    }

    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        tracing::debug!(src = %src_dir.display(), archive = %archive_path.display(), "native pack");
        let file = File::create(archive_path)
            .with_context(|| format!("creating {}", archive_path.display()))?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), self.level)
            .context("initializing zstd encoder")?;

        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder
            .append_dir_all(".", src_dir)
            .with_context(|| format!("archiving {}", src_dir.display()))?;

        let encoder = builder.into_inner().context("finishing tar stream")?;
        let mut writer = encoder.finish().context("finishing zstd stream")?;
        writer.flush().context("flushing archive")?;
        writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("syncing {}", archive_path.display()))?;
        Ok(())
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        tracing::debug!(archive = %archive_path.display(), dest = %dest_dir.display(), "native unpack");
        let file = File::open(archive_path)
            .with_context(|| format!("opening {}", archive_path.display()))?;
        let decoder = zstd::Decoder::new(BufReader::new(file)).context("initializing zstd decoder")?;

        let mut archive = tar::Archive::new(decoder);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive
            .unpack(dest_dir)
            .with_context(|| format!("unpacking {}", archive_path.display()))
    }
}
