//! Errors raised by credential cryptography.

use thiserror::Error;

/// Credential key and token failures.
///
/// `Malformed` and `SignatureMismatch` are distinct on purpose: the first is
/// a structural problem with what was scanned, the second means the bytes
/// parse but were not produced with our key.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material is missing, too short, or not valid hex.
    #[error("key error: {0}")]
    KeyError(String),

    /// The token could not be decoded into payload and tag.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The recomputed tag does not match the presented one.
    #[error("credential tag does not match payload")]
    SignatureMismatch,

    /// The payload could not be canonicalized for sealing.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] gatehouse_core::CanonicalizationError),
}
