//! # gatehouse-crypto: Credential Cryptography
//!
//! - **`CredentialKey`**: the server-side HMAC-SHA256 secret. Zeroized on
//!   drop, never printed.
//! - **`CredentialTag`**: a 32-byte HMAC tag with constant-time comparison.
//! - **Sealed tokens**: `base64url(payload) "." base64url(tag)`, where the
//!   payload is the canonical JSON of a [`CredentialPayload`].
//!
//! Only the SHA-256 digest of a token is ever stored; see [`token_digest`].
//!
//! ## Crate Policy
//!
//! - Depends only on `gatehouse-core` internally.
//! - Tests use real keys and real HMAC, no mocks.

pub mod error;
pub mod key;
pub mod token;

pub use error::CryptoError;
pub use key::{CredentialKey, CredentialTag, MIN_KEY_LEN};
pub use token::{
    decode_unverified, open, seal, token_digest, CredentialPayload, SealedToken,
    TOKEN_FORMAT_VERSION,
};
