//! # HMAC-SHA256 Credential Key
//!
//! The secret every credential tag is computed with. A single key is held by
//! the service; rotating it invalidates every outstanding credential.

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// Server-side secret for credential tags.
///
/// The key bytes are zeroized on drop. `Debug` prints only a short
/// fingerprint.
#[derive(Clone)]
pub struct CredentialKey {
    bytes: Zeroizing<Vec<u8>>,
    mac: HmacSha256,
}

impl CredentialKey {
    /// Generate a fresh 32-byte key from the OS random source.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; MIN_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Wrap raw key bytes. Rejects keys shorter than [`MIN_KEY_LEN`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(bytes);
        if bytes.len() < MIN_KEY_LEN {
            return Err(CryptoError::KeyError(format!(
                "credential key must be at least {MIN_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(&bytes)
            .map_err(|e| CryptoError::KeyError(format!("HMAC key rejected: {e}")))?;
        Ok(Self { bytes, mac })
    }

    /// Parse a hex-encoded key (surrounding whitespace ignored).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let decoded = hex::decode(s.trim())
            .map_err(|e| CryptoError::KeyError(format!("credential key is not valid hex: {e}")))?;
        Self::from_bytes(decoded)
    }

    /// Hex encoding of the key, for writing a freshly generated secret out.
    pub fn expose_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes.as_slice()))
    }

    /// First 8 hex chars of the SHA-256 of the key. Safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = gatehouse_core::sha256_raw(&self.bytes);
        digest.to_hex()[..8].to_string()
    }

    /// Compute the HMAC-SHA256 tag over `data`.
    pub fn sign(&self, data: &[u8]) -> CredentialTag {
        let mut mac = self.mac.clone();
        mac.update(data);
        let out = mac.finalize().into_bytes();
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&out);
        CredentialTag(tag)
    }

    /// Recompute the tag over `data` and compare it with `presented` in
    /// constant time.
    pub fn verify(&self, data: &[u8], presented: &[u8]) -> Result<(), CryptoError> {
        let expected = self.sign(data);
        if expected.ct_eq_bytes(presented) {
            Ok(())
        } else {
            Err(CryptoError::SignatureMismatch)
        }
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialKey(fp:{})", self.fingerprint())
    }
}

/// A 32-byte HMAC-SHA256 tag.
#[derive(Clone, Copy)]
pub struct CredentialTag([u8; 32]);

impl CredentialTag {
    /// Wrap raw tag bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Constant-time comparison against an arbitrary byte slice. A length
    /// mismatch compares unequal.
    pub fn ct_eq_bytes(&self, other: &[u8]) -> bool {
        self.0.as_slice().ct_eq(other).into()
    }
}

impl PartialEq for CredentialTag {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq_bytes(&other.0)
    }
}

impl Eq for CredentialTag {}

impl std::fmt::Debug for CredentialTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialTag({}...)", &hex::encode(self.0)[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CredentialKey {
        CredentialKey::from_bytes(vec![7u8; 32]).unwrap()
    }

    #[test]
    fn rejects_short_keys() {
        let err = CredentialKey::from_bytes(vec![0u8; 31]).unwrap_err();
        assert!(matches!(err, CryptoError::KeyError(_)));
    }

    #[test]
    fn from_hex_accepts_64_hex_chars() {
        let hex = "ab".repeat(32);
        let k = CredentialKey::from_hex(&format!("  {hex}\n")).unwrap();
        assert_eq!(k.expose_hex().as_str(), hex);
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert!(CredentialKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn generated_keys_differ() {
        let a = CredentialKey::generate().unwrap();
        let b = CredentialKey::generate().unwrap();
        assert_ne!(a.expose_hex().as_str(), b.expose_hex().as_str());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let k = key();
        let dbg = format!("{k:?}");
        assert!(!dbg.contains(&"07".repeat(32)));
        assert!(dbg.starts_with("CredentialKey(fp:"));
    }

    #[test]
    fn rfc4231_test_case_2() {
        // Key "Jefe" is below our floor, so exercise the MAC directly.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn sign_then_verify() {
        let k = key();
        let tag = k.sign(b"payload");
        assert!(k.verify(b"payload", tag.as_bytes()).is_ok());
    }

    #[test]
    fn verify_rejects_other_payload_and_other_key() {
        let k = key();
        let tag = k.sign(b"payload");
        assert!(matches!(k.verify(b"payloae", tag.as_bytes()), Err(CryptoError::SignatureMismatch)));
        let other = CredentialKey::from_bytes(vec![8u8; 32]).unwrap();
        assert!(other.verify(b"payload", tag.as_bytes()).is_err());
    }

    #[test]
    fn verify_rejects_truncated_tag() {
        let k = key();
        let tag = k.sign(b"payload");
        assert!(k.verify(b"payload", &tag.as_bytes()[..31]).is_err());
    }
}
