//! # Startup
//!
//! Builds [`AppState`] from configuration:
//!
//! 1. Load the directory seed, if `DIRECTORY_SEED` is set.
//! 2. Load the credential key from `CREDENTIAL_SECRET_HEX`, or generate an
//!    ephemeral one. Tokens minted with an ephemeral key die with the process.
//! 3. Wire engine and custody service to the system clock.

use std::sync::Arc;

use sqlx::PgPool;

use gatehouse_core::SystemTimeSource;
use gatehouse_crypto::{CredentialKey, CryptoError};
use gatehouse_engine::{DirectoryError, InMemoryDirectory};

use crate::config::AppConfig;
use crate::state::AppState;

/// Errors during startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The directory seed file could not be read or parsed.
    #[error("directory seed {path}: {source}")]
    DirectorySeed {
        path: String,
        #[source]
        source: DirectoryError,
    },

    /// The credential secret is unusable.
    #[error("credential key: {0}")]
    CredentialKey(#[from] CryptoError),
}

/// Load the directory named by the configuration, or an empty one.
pub fn load_directory(config: &AppConfig) -> Result<InMemoryDirectory, BootstrapError> {
    match &config.directory_seed {
        Some(path) => {
            let directory =
                InMemoryDirectory::from_file(path).map_err(|source| BootstrapError::DirectorySeed {
                    path: path.display().to_string(),
                    source,
                })?;
            tracing::info!(
                path = %path.display(),
                visitors = directory.visitor_count(),
                units = directory.unit_count(),
                "directory seed loaded"
            );
            Ok(directory)
        }
        None => {
            tracing::warn!("DIRECTORY_SEED not set; directory is empty and every visit request will be rejected");
            Ok(InMemoryDirectory::new())
        }
    }
}

/// Load the HMAC credential key, or generate an ephemeral one.
pub fn load_credential_key(config: &AppConfig) -> Result<CredentialKey, BootstrapError> {
    match &config.credential_secret_hex {
        Some(hex) => {
            let key = CredentialKey::from_hex(hex)?;
            tracing::info!(fingerprint = %key.fingerprint(), "credential key loaded");
            Ok(key)
        }
        None => {
            let key = CredentialKey::generate()?;
            tracing::warn!(
                fingerprint = %key.fingerprint(),
                "CREDENTIAL_SECRET_HEX not set; using an ephemeral key. Issued credentials will not validate after restart"
            );
            Ok(key)
        }
    }
}

/// Build application state from configuration and an optional pool.
pub fn bootstrap(config: AppConfig, db_pool: Option<PgPool>) -> Result<AppState, BootstrapError> {
    let directory = load_directory(&config)?;
    let key = load_credential_key(&config)?;
    tracing::info!(config = ?config, "gatehouse configured");
    Ok(AppState::from_parts(
        config,
        Arc::new(directory),
        key,
        Arc::new(SystemTimeSource),
        db_pool,
    ))
}
