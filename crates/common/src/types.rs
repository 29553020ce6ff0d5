use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured payload carried by commands and events.
///
/// Always a JSON object; "no payload" is expressed with `Option::None`.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Identity of an aggregate instance: its type plus a UUID string.
///
/// Equality is exact field equality. The `value` is kept as given, so two ids
/// differing only in hex-digit case are distinct even though both validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateId {
    /// Aggregate type name (e.g. "counter", "order").
    #[serde(rename = "type")]
    pub aggregate_type: String,

    /// Canonical UUID string (8-4-4-4-12 hex).
    pub value: String,
}

impl AggregateId {
    /// Creates an aggregate ID from raw parts without validating them.
    pub fn new(aggregate_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            value: value.into(),
        }
    }

    /// Creates a new aggregate ID with a random v4 UUID value.
    pub fn generate(aggregate_type: impl Into<String>) -> Self {
        Self::new(aggregate_type, Uuid::new_v4().to_string())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(aggregate_type: impl Into<String>, uuid: Uuid) -> Self {
        Self::new(aggregate_type, uuid.to_string())
    }

    /// Returns true when the type is non-empty and the value is a canonical UUID.
    pub fn is_valid(&self) -> bool {
        !self.aggregate_type.trim().is_empty() && is_canonical_uuid(&self.value)
    }

    /// Parses the value as a UUID, if it is one.
    pub fn as_uuid(&self) -> Option<Uuid> {
        parse_canonical(&self.value)
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.aggregate_type, self.value)
    }
}

/// Checks the hyphenated 8-4-4-4-12 form, case-insensitive.
///
/// `Uuid::try_parse` also accepts the simple, braced and URN forms; none of
/// those is 36 characters long.
pub fn is_canonical_uuid(value: &str) -> bool {
    parse_canonical(value).is_some()
}

fn parse_canonical(value: &str) -> Option<Uuid> {
    if value.len() != 36 {
        return None;
    }
    Uuid::try_parse(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_unique() {
        let id1 = AggregateId::generate("counter");
        let id2 = AggregateId::generate("counter");
        assert!(id1.is_valid());
        assert_ne!(id1, id2);
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = AggregateId::from_uuid("counter", uuid);
        assert_eq!(id.as_uuid(), Some(uuid));
    }

    #[test]
    fn canonical_uuid_accepts_mixed_case() {
        assert!(is_canonical_uuid("3F2504E0-4F89-11D3-9A0C-0305E82C3301"));
        assert!(is_canonical_uuid("3f2504e0-4f89-11d3-9a0c-0305e82c3301"));
    }

    #[test]
    fn canonical_uuid_rejects_other_forms() {
        assert!(!is_canonical_uuid(""));
        assert!(!is_canonical_uuid("3f2504e04f8911d39a0c0305e82c3301"));
        assert!(!is_canonical_uuid("{3f2504e0-4f89-11d3-9a0c-0305e82c3301}"));
        assert!(!is_canonical_uuid("3f2504e0-4f89-11d3-9a0c-0305e82c330g"));
        assert!(!is_canonical_uuid("3f2504e0-4f8911d3-9a0c--0305e82c3301"));
        assert!(!is_canonical_uuid("urn:uuid:3f2504e0-4f89-11d3-9a0c-0305e82c3301"));
    }

    #[test]
    fn as_uuid_only_for_canonical_values() {
        let braced = AggregateId::new("counter", "{3f2504e0-4f89-11d3-9a0c-0305e82c3301}");
        assert_eq!(braced.as_uuid(), None);

        let upper = AggregateId::new("counter", "3F2504E0-4F89-11D3-9A0C-0305E82C3301");
        assert_eq!(
            upper.as_uuid().map(|u| u.to_string()),
            Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301".to_string())
        );
    }

    #[test]
    fn empty_type_is_invalid() {
        let id = AggregateId::new(" ", Uuid::new_v4().to_string());
        assert!(!id.is_valid());
    }

    #[test]
    fn ids_differing_in_case_are_not_equal() {
        let lower = AggregateId::new("counter", "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
        let upper = AggregateId::new("counter", "3F2504E0-4F89-11D3-9A0C-0305E82C3301");
        assert!(lower.is_valid() && upper.is_valid());
        assert_ne!(lower, upper);
    }

    #[test]
    fn serializes_type_field() {
        let id = AggregateId::new("counter", "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["type"], "counter");
        let back: AggregateId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
