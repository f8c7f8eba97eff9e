//! vbk-archive: pack a directory tree into one zstd-compressed tar stream and back
//!
//! Two interchangeable strategies implement [`Archiver`]:
//! - [`SystemTar`]: shells out to `tar --zstd` (fast, preserves everything GNU tar does)
//! - [`NativeTar`]: in-process `tar` + `zstd`, used when no capable `tar` is on PATH
//!
//! Both produce the same format, so an archive packed by one unpacks with the other.

pub mod native;
pub mod system;

use std::path::Path;

use vbk_core::config::ArchiveStrategy;

pub use native::NativeTar;
pub use system::SystemTar;

/// Default zstd level used by both strategies
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Packs the contents of a directory into a single archive file and back.
///
/// Archives store paths relative to the source directory, so unpacking
/// recreates the tree under whatever destination is given.
pub trait Archiver: Send + Sync {
    /// Short strategy name for logs
    fn name(&self) -> &'static str;

    /// Archive everything under `src_dir` into `archive_path`.
    fn pack(&self, src_dir: &Path, archive_path: &Path) -> anyhow::Result<()>;

    /// Extract `archive_path` into the existing directory `dest_dir`.
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> anyhow::Result<()>;
}

/// Pick an archiver for `strategy`.
///
/// `Auto` probes the system `tar` once and falls back to [`NativeTar`] when it
/// is missing or lacks zstd support.
pub fn select_archiver(strategy: ArchiveStrategy, level: i32) -> Box<dyn Archiver> {
    let archiver: Box<dyn Archiver> = match strategy {
        ArchiveStrategy::System => Box::new(SystemTar::new()),
        ArchiveStrategy::Native => Box::new(NativeTar::new(level)),
        ArchiveStrategy::Auto => {
            if SystemTar::available() {
                Box::new(SystemTar::new())
            } else {
                tracing::info!("system tar without zstd support, using built-in archiver");
                Box::new(NativeTar::new(level))
            }
        }
    };
    tracing::debug!(strategy = archiver.name(), "archiver selected");
    archiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_strategies() {
        assert_eq!(select_archiver(ArchiveStrategy::Native, 3).name(), "native");
        assert_eq!(select_archiver(ArchiveStrategy::System, 3).name(), "system");
    }

    #[test]
    fn test_auto_matches_probe() {
        let expected = if SystemTar::available() { "system" } else { "native" };
        assert_eq!(select_archiver(ArchiveStrategy::Auto, 3).name(), expected);
    }
}
