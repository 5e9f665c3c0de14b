//! # Identity Newtypes
//!
//! Each identifier is a distinct type: a [`UnitId`] cannot be passed where a
//! [`VisitorId`] is expected.
//!
//! Visit and correspondence identifiers are UUID v4 minted by the gatehouse.
//! Visitor and unit identifiers are opaque keys owned by the external
//! directory; they are validated for shape only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidUuid {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a single visit record.
    VisitId,
    "visit id"
);

uuid_id!(
    /// Identifier of a correspondence (mail or parcel) record.
    CorrespondenceId,
    "correspondence id"
);

// ---------------------------------------------------------------------------
// Directory keys (validated at construction)
// ---------------------------------------------------------------------------

const MAX_KEY_LEN: usize = 64;

fn validate_key(kind: &'static str, s: &str) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError::EmptyIdentifier { kind });
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-');
    if s.len() > MAX_KEY_LEN || !s.chars().all(allowed) {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            value: s.to_string(),
        });
    }
    Ok(())
}

/// Key of a visitor in the external directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VisitorId(String);

impl VisitorId {
    /// Create a visitor id, validating its shape.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        validate_key("visitor id", &s)?;
        Ok(Self(s))
    }

    /// Access the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key of a residential unit in the external directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Create a unit id, validating its shape.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        validate_key("unit id", &s)?;
        Ok(Self(s))
    }

    /// Access the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VisitorId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<VisitorId> for String {
    fn from(id: VisitorId) -> Self {
        id.0
    }
}

impl TryFrom<String> for UnitId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_ids_are_unique() {
        assert_ne!(VisitId::new(), VisitId::new());
    }

    #[test]
    fn visit_id_parse_roundtrip() {
        let id = VisitId::new();
        let parsed = VisitId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn visit_id_parse_rejects_garbage() {
        let err = VisitId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUuid { kind: "visit id", .. }));
    }

    #[test]
    fn uuid_ids_serialize_transparently() {
        let id = CorrespondenceId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn unit_id_accepts_typical_keys() {
        for key in ["A-101", "tower2:1504", "unit_7", "B.12"] {
            assert!(UnitId::new(key).is_ok(), "{key} should be accepted");
        }
    }

    #[test]
    fn visitor_id_rejects_empty() {
        assert_eq!(
            VisitorId::new("").unwrap_err(),
            ValidationError::EmptyIdentifier { kind: "visitor id" }
        );
    }

    #[test]
    fn visitor_id_rejects_whitespace_and_overlong() {
        assert!(VisitorId::new("has space").is_err());
        assert!(VisitorId::new("x".repeat(65)).is_err());
        assert!(VisitorId::new("x".repeat(64)).is_ok());
    }

    #[test]
    fn directory_keys_validate_on_deserialize() {
        let ok: UnitId = serde_json::from_str("\"A-101\"").unwrap();
        assert_eq!(ok.as_str(), "A-101");
        assert!(serde_json::from_str::<UnitId>("\"\"").is_err());
    }
}
