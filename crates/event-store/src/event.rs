use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Payload};

/// Version number of an aggregate, used for optimistic concurrency control.
///
/// A state at version 0 has no backing events. The first event carries
/// version 1 and each accepted command advances it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a provisional, not yet created aggregate (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version of the first event (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version, or `None` once the version space is
    /// exhausted.
    pub fn checked_next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Number of versions between `earlier` and `self`, zero if `earlier` is ahead.
    pub fn distance_from(&self, earlier: Version) -> u64 {
        self.0
            .checked_sub(earlier.0)
            .and_then(|d| u64::try_from(d).ok())
            .unwrap_or(0)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A fact about an aggregate, as decided by its `decide` function.
///
/// `payload`, when present, must be a non-empty object; callers express
/// "no payload" with `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event type name (e.g. "created", "incremented").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The aggregate this event belongs to.
    pub id: AggregateId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl DomainEvent {
    /// Creates an event without a payload.
    pub fn new(event_type: impl Into<String>, id: AggregateId) -> Self {
        Self {
            event_type: event_type.into(),
            id,
            payload: None,
        }
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the payload from a JSON value; non-object values leave it unset.
    pub fn with_json(mut self, payload: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = payload {
            self.payload = Some(map);
        }
        self
    }

    /// Looks up a payload field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }

    /// Stamps the event with its version and timestamp.
    pub fn extend(self, version: Version, timestamp: DateTime<Utc>) -> ExtendedDomainEvent {
        ExtendedDomainEvent {
            event: self,
            version,
            timestamp,
        }
    }
}

/// A decided event stamped with its stream version and decision time.
///
/// Only the command pipeline creates these; callers never assign versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedDomainEvent {
    #[serde(flatten)]
    pub event: DomainEvent,

    /// Position of the event in its aggregate stream (starting at 1).
    pub version: Version,

    /// When the event was decided.
    pub timestamp: DateTime<Utc>,
}

impl ExtendedDomainEvent {
    /// Strips the version and timestamp.
    pub fn into_inner(self) -> DomainEvent {
        self.event
    }
}

impl Deref for ExtendedDomainEvent {
    type Target = DomainEvent;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> AggregateId {
        AggregateId::generate("counter")
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.checked_next(), Some(v2));
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().checked_next(), Some(Version::first()));
    }

    #[test]
    fn version_space_is_bounded() {
        assert_eq!(Version::new(i64::MAX).checked_next(), None);
        assert_eq!(Version::new(i64::MAX).distance_from(Version::new(-1)), 0);
    }

    #[test]
    fn version_distance_saturates() {
        assert_eq!(Version::new(100).distance_from(Version::initial()), 100);
        assert_eq!(Version::new(3).distance_from(Version::new(5)), 0);
    }

    #[test]
    fn with_json_ignores_non_objects() {
        let event = DomainEvent::new("created", id()).with_json(serde_json::json!([1, 2]));
        assert!(event.payload.is_none());

        let event = DomainEvent::new("created", id()).with_json(serde_json::json!({"count": 1}));
        assert_eq!(event.field("count"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn extended_event_serializes_flat() {
        let now = Utc::now();
        let event = DomainEvent::new("created", id())
            .with_json(serde_json::json!({"count": 0}))
            .extend(Version::first(), now);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "created");
        assert_eq!(json["version"], 1);
        assert_eq!(json["payload"]["count"], 0);

        let back: ExtendedDomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type, "created");
    }
}
