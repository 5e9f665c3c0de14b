//! # gatehouse-cli: Operator Tooling
//!
//! Provides the `gatehouse` command-line interface for desk operators and
//! deployment scripts.
//!
//! ## Subcommands
//!
//! - `gatehouse secret generate`: Mint a new credential secret.
//! - `gatehouse token inspect`: Print a token's claims without verifying.
//! - `gatehouse token verify`: Check a token's tag and expiry offline.
//!
//! ```bash
//! gatehouse secret generate --output /etc/gatehouse/credential.key
//! gatehouse token verify "$TOKEN" --secret-file /etc/gatehouse/credential.key
//! ```
//!
//! Handlers return the process exit code: `0` on success, `2` when a token
//! was checked and refused. Operational failures (unreadable files, bad
//! secrets) surface as errors and exit `1`.

pub mod secret;
pub mod token;

use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use gatehouse_crypto::CredentialKey;

/// Exit code for a token that was examined and refused.
pub const EXIT_REFUSED: u8 = 2;

/// Read a hex credential secret from a file.
pub fn read_secret_file(path: &Path) -> Result<CredentialKey> {
    let contents = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read secret file: {}", path.display()))?,
    );
    CredentialKey::from_hex(&contents)
        .with_context(|| format!("secret file {} does not hold a usable key", path.display()))
}
