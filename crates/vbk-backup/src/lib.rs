//! vbk-backup: the backup, restore and gencert pipelines
//!
//! ```text
//! backup:  data_dir ──Archiver::pack──▶ .tar.zst ──encrypt_file──▶ .crypt ──put──▶ bucket/<name>
//! restore: bucket/<name> ──get──▶ .crypt ──decrypt_file──▶ .tar.zst ──Archiver::unpack──▶ data_dir
//! gencert: KeyPairProvider::generate ──▶ config_dir/{key.pem, cert.pem}
//! ```
//!
//! Scratch files live in a private directory under `work_dir` and are removed
//! whether the pipeline succeeds or not.

pub mod engine;

pub use engine::{backup, gencert, restore, BackupReport, GeneratedFiles, RestoreReport};
