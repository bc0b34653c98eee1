//! Command-line probe for settings encryption.
//!
//! # Responsibility
//! - Verify `settings_core` linkage (`version`).
//! - Encrypt and decrypt single column values with the key from
//!   `SETTINGS_ENCRYPTION_KEY`.
//! - Write rolling logs to `SETTINGS_LOG_DIR` when it is set, at
//!   `SETTINGS_LOG_LEVEL` (default `info`).

use clap::{Parser, Subcommand};
use settings_core::{init_encryption, init_logging, EncryptedColumn, EncryptionConfig, LogConfig};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "settings_cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Encrypt and decrypt settings column values")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the linked settings_core version
    Version,
    /// Encrypt plaintext into the stored column form
    Encrypt { text: String },
    /// Decrypt a stored column value
    Decrypt {
        /// Stored text; `--ENCR--` marked values are taken as-is
        #[arg(allow_hyphen_values = true)]
        text: String,
    },
}

fn main() -> ExitCode {
    let logging = LogConfig::from_env().and_then(|config| match config {
        Some(config) => init_logging(&config.echo_warnings()),
        None => Ok(()),
    });
    if let Err(err) = logging {
        eprintln!("logging disabled: {err}");
    }

    match run(Cli::parse().command) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<String, String> {
    match command {
        Command::Version => Ok(format!(
            "settings_core version={}",
            settings_core::core_version()
        )),
        Command::Encrypt { text } => configured_column()?
            .dump(Some(&text))
            .map(Option::unwrap_or_default)
            .map_err(|err| format!("encrypt failed: {err}")),
        Command::Decrypt { text } => configured_column()?
            .load(Some(&text))
            .map(Option::unwrap_or_default)
            .map_err(|err| format!("decrypt failed: {err}")),
    }
}

fn configured_column() -> Result<EncryptedColumn, String> {
    let config = EncryptionConfig::from_env();
    if config.key.is_none() {
        return Err("SETTINGS_ENCRYPTION_KEY is not set".to_string());
    }
    init_encryption(config)?;
    Ok(EncryptedColumn::new())
}
