//! volume-backup: encrypted backups of a mounted volume to S3
//!
//! Commands:
//!   backup <bucket> <name>    - archive the data dir, encrypt for cert.pem, upload
//!   restore <bucket> <name>   - confirm the private key, download, decrypt, unpack
//!   gencert                   - write a new key.pem / cert.pem pair to the config dir

mod prompt;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use vbk_core::config::VbkConfig;
use vbk_core::fs::is_dir_empty;
use vbk_core::{VbkError, VbkResult};
use vbk_crypto::{EnvelopeCodec, KeyEntry, KeyPairProvider, RsaPublicKey};

#[derive(Parser, Debug)]
#[command(
    name = "volume-backup",
    version,
    about = "Encrypted volume backups to S3-compatible storage"
)]
struct Cli {
    /// Path to volume-backup.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "VBK_CONFIG",
        default_value = "/config/volume-backup.toml"
    )]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Log format (defaults to [log].format)
    #[arg(long, env = "VBK_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Archive, encrypt and upload the data directory
    Backup {
        /// Target bucket
        bucket: String,
        /// Object name for this backup
        name: String,
    },

    /// Download, decrypt and unpack a backup into the (empty) data directory
    Restore {
        /// Source bucket
        bucket: String,
        /// Object name of the backup
        name: String,
        /// Read the private key from this file instead of stdin
        #[arg(long, env = "VBK_KEY_FILE")]
        key_file: Option<PathBuf>,
    },

    /// Generate a private key and self-signed certificate in the config directory
    Gencert {
        /// Do not ask for a password; write the private key unencrypted
        #[arg(long)]
        no_password: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = VbkConfig::load(&cli.config);
    let log = loaded
        .as_ref()
        .map(|c| c.log.clone())
        .unwrap_or_default();
    let level = if cli.verbose { "debug" } else { log.level.as_str() };
    let format = cli.log_format.unwrap_or(match log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(level, format);

    if !cli.config.exists() {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }

    let result = match loaded {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    ExitCode::from(exit_status(&result))
}

/// Process status for a command outcome; failures are logged with their category.
fn exit_status(result: &VbkResult<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(category = e.category(), "{e}");
            u8::try_from(e.exit_code()).unwrap_or(1)
        }
    }
}

async fn run(command: Commands, config: VbkConfig) -> VbkResult<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "volume-backup starting");
    match command {
        Commands::Backup { bucket, name } => cmd_backup(&config, &bucket, &name).await,
        Commands::Restore {
            bucket,
            name,
            key_file,
        } => cmd_restore(&config, &bucket, &name, key_file).await,
        Commands::Gencert { no_password } => cmd_gencert(&config, no_password),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_backup(config: &VbkConfig, bucket: &str, name: &str) -> VbkResult<()> {
    let provider = KeyPairProvider::new(config.crypto.key_params())?;
    let public_key = load_certificate(&provider, &config.paths.certificate())?;
    let codec = EnvelopeCodec::new(config.crypto.chunk_size)?;
    let op = build_operator_from_env(config, bucket)?;
    let archiver = select_archiver(config);

    let report =
        vbk_backup::backup(&op, &config.paths, &public_key, &codec, archiver, name).await?;
    println!(
        "backed up {} to {bucket}/{} ({} bytes, {} chunks)",
        config.paths.data_dir.display(),
        report.name,
        report.uploaded_bytes,
        report.envelope.chunks
    );
    Ok(())
}

async fn cmd_restore(
    config: &VbkConfig,
    bucket: &str,
    name: &str,
    key_file: Option<PathBuf>,
) -> VbkResult<()> {
    // Checked here as well so the operator is not asked for a key in vain.
    if !is_dir_empty(&config.paths.data_dir)? {
        return Err(VbkError::Precondition(format!(
            "{} is not empty, refusing to restore over existing data",
            config.paths.data_dir.display()
        )));
    }

    let provider = KeyPairProvider::new(config.crypto.key_params())?;
    let public_key = load_certificate(&provider, &config.paths.certificate())?;
    let codec = EnvelopeCodec::new(config.crypto.chunk_size)?;
    let op = build_operator_from_env(config, bucket)?;

    let entry = KeyEntry::new(&provider, &public_key, config.crypto.key_entry_attempts)?;
    let mut prompt = prompt::TerminalPrompt::new(key_file);
    let private_key = entry.run(&mut prompt)?;

    let archiver = select_archiver(config);
    let report =
        vbk_backup::restore(&op, &config.paths, &private_key, &codec, archiver, name).await?;
    println!(
        "restored {bucket}/{} into {} ({} bytes)",
        report.name,
        config.paths.data_dir.display(),
        report.envelope.plaintext_bytes
    );
    Ok(())
}

fn cmd_gencert(config: &VbkConfig, no_password: bool) -> VbkResult<()> {
    let provider = KeyPairProvider::new(config.crypto.key_params())?;
    let password = if no_password {
        None
    } else {
        prompt::prompt_new_password()
    };

    let files = vbk_backup::gencert(&config.paths.config_dir, &provider, password.as_ref())?;
    println!("private key: {}", files.private_key.display());
    println!("certificate: {}", files.certificate.display());
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_certificate(provider: &KeyPairProvider, path: &Path) -> VbkResult<RsaPublicKey> {
    let pem = std::fs::read(path).map_err(|e| {
        VbkError::Precondition(format!(
            "reading certificate {}: {e} (run `volume-backup gencert` first)",
            path.display()
        ))
    })?;
    Ok(provider.load_public_key(&pem)?)
}

fn select_archiver(config: &VbkConfig) -> Arc<dyn vbk_archive::Archiver> {
    Arc::from(vbk_archive::select_archiver(
        config.archive.strategy,
        config.archive.zstd_level,
    ))
}

/// Build an OpenDAL operator for `bucket` using credentials from environment variables.
///
/// Reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (standard S3 env vars),
/// falling back to VBK_ACCESS_KEY_ID / VBK_SECRET_ACCESS_KEY.
fn build_operator_from_env(config: &VbkConfig, bucket: &str) -> VbkResult<opendal::Operator> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("VBK_ACCESS_KEY_ID"))
        .map_err(|_| {
            VbkError::Config(
                "S3 credentials not set: export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".into(),
            )
        })?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("VBK_SECRET_ACCESS_KEY"))
        .map_err(|_| VbkError::Config("AWS_SECRET_ACCESS_KEY environment variable not set".into()))?;

    vbk_storage::build_from_core_config(&config.storage, bucket, &access_key, &secret_key)
        .map_err(|e| VbkError::Storage(format!("building storage operator: {e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["volume-backup", "-v", "backup", "backups", "nightly"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Backup { ref bucket, ref name } if bucket == "backups" && name == "nightly"
        ));

        let cli = Cli::try_parse_from([
            "volume-backup",
            "restore",
            "backups",
            "nightly",
            "--key-file",
            "/keys/key.pem",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Restore { key_file: Some(ref p), .. } if p == Path::new("/keys/key.pem")
        ));

        let cli = Cli::try_parse_from(["volume-backup", "gencert", "--no-password", "-v"]).unwrap();
        assert!(matches!(cli.command, Commands::Gencert { no_password: true }));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_bucket_and_name() {
        assert!(Cli::try_parse_from(["volume-backup", "backup", "backups"]).is_err());
        assert!(Cli::try_parse_from(["volume-backup"]).is_err());
    }

    #[test]
    fn test_cli_log_format() {
        let cli = Cli::try_parse_from(["volume-backup", "--log-format", "json", "gencert"]).unwrap();
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
    }

    #[test]
    fn test_exit_status_follows_error_category() {
        use vbk_crypto::CryptoError;

        assert_eq!(exit_status(&Ok(())), 0);
        assert_eq!(
            exit_status(&Err(VbkError::Precondition("data dir not empty".into()))),
            2
        );
        assert_eq!(
            exit_status(&Err(CryptoError::UnsupportedKeyType("ec".into()).into())),
            3
        );
        assert_eq!(
            exit_status(&Err(CryptoError::TamperedData("chunk 3".into()).into())),
            4
        );
        assert_eq!(exit_status(&Err(VbkError::Storage("no such bucket".into()))), 1);
    }

    #[test]
    fn test_missing_certificate_is_precondition() {
        let provider = KeyPairProvider::default();
        let err = load_certificate(&provider, Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(matches!(err, VbkError::Precondition(_)));
    }
}
