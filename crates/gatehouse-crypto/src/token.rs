//! # Sealed Credential Tokens
//!
//! Wire format: `base64url(payload) "." base64url(tag)`, both without
//! padding. `payload` is the canonical JSON of a [`CredentialPayload`] and
//! `tag` is HMAC-SHA256 over exactly those payload bytes.
//!
//! Opening a token checks structure first, then the tag, and only then
//! parses the payload. A payload is never interpreted before its tag has
//! been verified.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use gatehouse_core::{
    sha256_digest, sha256_raw, CanonicalBytes, ContentDigest, Timestamp, UnitId, VisitId,
};

use crate::error::CryptoError;
use crate::key::CredentialKey;

/// Payload format version carried in every token.
pub const TOKEN_FORMAT_VERSION: u8 = 1;

const TAG_LEN: usize = 32;
const NONCE_LEN: usize = 16;

/// The signed claims inside a credential token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialPayload {
    /// Format version, always [`TOKEN_FORMAT_VERSION`].
    pub v: u8,
    /// The visit this credential admits.
    pub visit_id: VisitId,
    /// The unit being visited.
    pub unit_id: UnitId,
    /// Issue instant, Unix seconds.
    pub issued_at: i64,
    /// Expiry instant, Unix seconds. Presentation after this is rejected.
    pub expires_at: i64,
    /// 16 random bytes, hex. Makes two credentials for the same visit and
    /// validity window distinct.
    pub nonce: String,
}

impl CredentialPayload {
    /// Build a payload with a fresh random nonce.
    pub fn new(visit_id: VisitId, unit_id: UnitId, issued_at: Timestamp, expires_at: Timestamp) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Self {
            v: TOKEN_FORMAT_VERSION,
            visit_id,
            unit_id,
            issued_at: issued_at.epoch_secs(),
            expires_at: expires_at.epoch_secs(),
            nonce: hex::encode(nonce),
        }
    }

    /// Expiry as a [`Timestamp`].
    pub fn expires_at(&self) -> Result<Timestamp, CryptoError> {
        Timestamp::from_epoch_secs(self.expires_at)
            .map_err(|e| CryptoError::Malformed(format!("expires_at: {e}")))
    }

    /// Issue instant as a [`Timestamp`].
    pub fn issued_at(&self) -> Result<Timestamp, CryptoError> {
        Timestamp::from_epoch_secs(self.issued_at)
            .map_err(|e| CryptoError::Malformed(format!("issued_at: {e}")))
    }

    /// True when `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now.epoch_secs() > self.expires_at
    }
}

/// A freshly sealed token and what the issuer keeps of it.
#[derive(Debug, Clone)]
pub struct SealedToken {
    /// The transport string handed to the visitor. Never stored or logged.
    pub token: String,
    /// SHA-256 hex of `token`, the only form persisted.
    pub token_digest: String,
    /// Digest of the canonical payload, for log correlation.
    pub payload_digest: ContentDigest,
}

/// Canonicalize, tag, and encode a payload.
pub fn seal(payload: &CredentialPayload, key: &CredentialKey) -> Result<SealedToken, CryptoError> {
    let canonical = CanonicalBytes::new(payload)?;
    let tag = key.sign(canonical.as_bytes());
    let token = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(canonical.as_bytes()),
        URL_SAFE_NO_PAD.encode(tag.as_bytes())
    );
    Ok(SealedToken {
        token_digest: token_digest(&token),
        payload_digest: sha256_digest(&canonical),
        token,
    })
}

/// Verify a token's tag and return its payload.
///
/// # Errors
///
/// - `Malformed` if the token is not two base64url segments, the tag is not
///   32 bytes, or (after a good tag) the payload does not parse.
/// - `SignatureMismatch` if the tag does not match the payload bytes.
pub fn open(token: &str, key: &CredentialKey) -> Result<CredentialPayload, CryptoError> {
    let (payload_bytes, tag_bytes) = split(token)?;
    key.verify(&payload_bytes, &tag_bytes)?;
    parse_payload(&payload_bytes)
}

/// Decode a token's payload without checking the tag.
///
/// For operator inspection, and for finding which record a token names
/// before it is verified. Nothing returned here may be trusted.
pub fn decode_unverified(token: &str) -> Result<CredentialPayload, CryptoError> {
    let (payload_bytes, _) = split(token)?;
    parse_payload(&payload_bytes)
}

/// SHA-256 hex of the token string.
pub fn token_digest(token: &str) -> String {
    sha256_raw(token.trim().as_bytes()).to_hex()
}

fn split(token: &str) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let token = token.trim();
    let (payload_b64, tag_b64) = token
        .split_once('.')
        .ok_or_else(|| CryptoError::Malformed("expected <payload>.<tag>".into()))?;
    if payload_b64.is_empty() || tag_b64.contains('.') {
        return Err(CryptoError::Malformed("expected exactly two segments".into()));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| CryptoError::Malformed(format!("payload segment: {e}")))?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag_b64)
        .map_err(|e| CryptoError::Malformed(format!("tag segment: {e}")))?;
    if tag.len() != TAG_LEN {
        return Err(CryptoError::Malformed(format!(
            "tag must be {TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }
    Ok((payload, tag))
}

fn parse_payload(bytes: &[u8]) -> Result<CredentialPayload, CryptoError> {
    let payload: CredentialPayload = serde_json::from_slice(bytes)
        .map_err(|e| CryptoError::Malformed(format!("payload: {e}")))?;
    if payload.v != TOKEN_FORMAT_VERSION {
        return Err(CryptoError::Malformed(format!(
            "unsupported token version {}",
            payload.v
        )));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CredentialKey {
        CredentialKey::from_bytes(vec![0x42; 32]).unwrap()
    }

    fn payload() -> CredentialPayload {
        let issued = Timestamp::parse("2026-01-15T10:00:00Z").unwrap();
        CredentialPayload::new(
            VisitId::new(),
            UnitId::new("A-101").unwrap(),
            issued,
            issued.plus_hours(24),
        )
    }

    fn reencode(payload: &[u8], tag: &[u8]) -> String {
        format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), URL_SAFE_NO_PAD.encode(tag))
    }

    #[test]
    fn seal_then_open() {
        let k = key();
        let p = payload();
        let sealed = seal(&p, &k).unwrap();
        assert_eq!(open(&sealed.token, &k).unwrap(), p);
    }

    #[test]
    fn payload_segment_is_canonical_json() {
        let p = payload();
        let sealed = seal(&p, &key()).unwrap();
        let (seg, _) = sealed.token.split_once('.').unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(seg).unwrap();
        assert_eq!(bytes, CanonicalBytes::new(&p).unwrap().into_bytes());
    }

    #[test]
    fn digest_is_stable_and_not_the_token() {
        let sealed = seal(&payload(), &key()).unwrap();
        assert_eq!(sealed.token_digest, token_digest(&sealed.token));
        assert_eq!(sealed.token_digest.len(), 64);
        assert!(!sealed.token.contains(&sealed.token_digest));
    }

    #[test]
    fn nonces_make_tokens_distinct() {
        let k = key();
        let issued = Timestamp::parse("2026-01-15T10:00:00Z").unwrap();
        let visit = VisitId::new();
        let unit = UnitId::new("A-101").unwrap();
        let a = CredentialPayload::new(visit, unit.clone(), issued, issued.plus_hours(1));
        let b = CredentialPayload::new(visit, unit, issued, issued.plus_hours(1));
        assert_ne!(seal(&a, &k).unwrap().token, seal(&b, &k).unwrap().token);
    }

    #[test]
    fn wrong_key_is_signature_mismatch() {
        let sealed = seal(&payload(), &key()).unwrap();
        let other = CredentialKey::from_bytes(vec![0x43; 32]).unwrap();
        assert!(matches!(open(&sealed.token, &other), Err(CryptoError::SignatureMismatch)));
    }

    #[test]
    fn structural_garbage_is_malformed() {
        let k = key();
        for bad in ["", "abc", "abc.", ".abc", "a.b.c", "!!!.???"] {
            assert!(
                matches!(open(bad, &k), Err(CryptoError::Malformed(_))),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn short_tag_is_malformed_not_mismatch() {
        let sealed = seal(&payload(), &key()).unwrap();
        let (seg, tag_seg) = sealed.token.split_once('.').unwrap();
        let mut tag = URL_SAFE_NO_PAD.decode(tag_seg).unwrap();
        tag.pop();
        let token = format!("{seg}.{}", URL_SAFE_NO_PAD.encode(tag));
        assert!(matches!(open(&token, &key()), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn forged_payload_with_valid_tag_shape_is_mismatch() {
        let k = key();
        let mut forged = payload();
        forged.expires_at += 86_400 * 365;
        let token = reencode(&CanonicalBytes::new(&forged).unwrap().into_bytes(), &[0u8; 32]);
        assert!(matches!(open(&token, &k), Err(CryptoError::SignatureMismatch)));
    }

    #[test]
    fn well_tagged_non_payload_is_malformed() {
        let k = key();
        let body = br#"{"hello":"world"}"#;
        let token = reencode(body, k.sign(body).as_bytes());
        assert!(matches!(open(&token, &k), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn decode_unverified_ignores_tag() {
        let p = payload();
        let sealed = seal(&p, &key()).unwrap();
        let (seg, _) = sealed.token.split_once('.').unwrap();
        let token = format!("{seg}.{}", URL_SAFE_NO_PAD.encode([1u8; 32]));
        assert_eq!(decode_unverified(&token).unwrap(), p);
    }

    #[test]
    fn expiry_is_strictly_after() {
        let p = payload();
        let exp = p.expires_at().unwrap();
        assert!(!p.is_expired_at(exp));
        assert!(p.is_expired_at(Timestamp::from_epoch_secs(exp.epoch_secs() + 1).unwrap()));
    }
}
