//! # Secret Subcommand
//!
//! Generates the HMAC secret the API reads from `CREDENTIAL_SECRET_HEX`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use gatehouse_crypto::CredentialKey;

/// Arguments for the secret subcommand.
#[derive(Args, Debug)]
pub struct SecretArgs {
    #[command(subcommand)]
    pub command: SecretCommand,
}

#[derive(Subcommand, Debug)]
pub enum SecretCommand {
    /// Generate a new 32-byte secret, hex encoded.
    Generate {
        /// Write the secret to this file instead of stdout. Refuses to
        /// overwrite an existing file.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Execute the secret subcommand.
pub fn run_secret(args: &SecretArgs) -> Result<u8> {
    match &args.command {
        SecretCommand::Generate { output } => run_generate(output.as_deref()),
    }
}

fn run_generate(output: Option<&Path>) -> Result<u8> {
    let key = CredentialKey::generate().context("failed to generate credential secret")?;
    let hex = key.expose_hex();

    match output {
        Some(path) => {
            write_new_file(path, hex.as_bytes())?;
            tracing::info!(path = %path.display(), "credential secret written");
            println!("fingerprint: {}", key.fingerprint());
        }
        None => println!("{}", hex.as_str()),
    }
    Ok(0)
}

fn write_new_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create secret file: {}", path.display()))?;
    file.write_all(contents)
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("failed to write secret file: {}", path.display()))
}
