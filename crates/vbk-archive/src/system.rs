//! `tar --zstd` subprocess strategy

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::Archiver;

#[derive(Debug, Clone)]
pub struct SystemTar {
    program: String,
}

impl Default for SystemTar {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTar {
    pub fn new() -> Self {
        Self {
            program: "tar".into(),
        }
    }

    /// True if a `tar` on PATH understands `--zstd`.
    pub fn available() -> bool {
        Command::new("tar")
            .args(["--zstd", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, args: &[&std::ffi::OsStr]) -> Result<()> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("running {}", self.program))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}{}",
                self.program,
                output.status,
                stdout.trim(),
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl Archiver for SystemTar {
    fn name(&self) -> &'static str {
        "system"
    }

    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        tracing::debug!(src = %src_dir.display(), archive = %archive_path.display(), "tar pack");
        self.run(&[
            "--zstd".as_ref(),
            "-cf".as_ref(),
            archive_path.as_os_str(),
            "-C".as_ref(),
            src_dir.as_os_str(),
            ".".as_ref(),
        ])
        .with_context(|| format!("packing {}", src_dir.display()))
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        tracing::debug!(archive = %archive_path.display(), dest = %dest_dir.display(), "tar unpack");
        self.run(&[
            "--zstd".as_ref(),
            "-xf".as_ref(),
            archive_path.as_os_str(),
            "-C".as_ref(),
            dest_dir.as_os_str(),
        ])
        .with_context(|| format!("unpacking {}", archive_path.display()))
    }
}
