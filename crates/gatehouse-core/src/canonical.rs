//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only byte representation a credential tag or a
//! payload digest is computed over. Serialization uses `serde_jcs`
//! (RFC 8785): sorted keys, compact separators, one byte sequence per value.
//!
//! Floats are rejected. Every number in a credential payload is an integer
//! (epoch seconds, a format version), and JCS float formatting is the one
//! place where two honest serializers can disagree.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - The only constructor is `CanonicalBytes::new()`.
/// - All numbers are integers.
/// - Object keys are sorted, separators are compact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number;
    /// `SerializationFailed` if serialization itself fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the owned byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_keys_and_compacts() {
        let data = serde_json::json!({"visit_id": "x", "exp": 2, "iat": 1});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"exp":2,"iat":1,"visit_id":"x"}"#
        );
    }

    #[test]
    fn nested_objects_sorted() {
        let data = serde_json::json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1]});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#
        );
    }

    #[test]
    fn float_rejected_even_when_nested() {
        let err = CanonicalBytes::new(&serde_json::json!({"a": {"b": [{"c": 3.5}]}})).unwrap_err();
        assert!(matches!(err, CanonicalizationError::FloatRejected(f) if f == 3.5));
    }

    #[test]
    fn negative_and_large_integers_accepted() {
        let cb = CanonicalBytes::new(&serde_json::json!({"a": -42, "b": 9_999_999_999i64})).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":-42,"b":9999999999}"#);
    }

    #[test]
    fn unicode_passes_through_as_utf8() {
        let cb = CanonicalBytes::new(&serde_json::json!({"nome": "João"})).unwrap();
        assert!(std::str::from_utf8(cb.as_bytes()).unwrap().contains("João"));
    }

    #[test]
    fn empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
    }
}
