//! vbk-storage: OpenDAL object storage for backup envelopes

pub mod health;
pub mod operator;
pub mod transfer;

pub use health::check_bucket;
pub use operator::{build_from_core_config, build_operator, StorageConfig};
pub use transfer::{get, put, PART_SIZE};
