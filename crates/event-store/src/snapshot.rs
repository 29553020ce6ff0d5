use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, ExtendedDomainEvent, ExtendedState, Version};

/// A cached reconstruction of aggregate state at a specific version.
///
/// Snapshots shorten replay; the event log stays the source of truth and a
/// snapshot may be missing or removed without changing replayed state.
/// A snapshot is only usable while the log holds its covering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub state: ExtendedState,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// The event that produced `state`, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<ExtendedDomainEvent>,
}

impl Snapshot {
    /// Creates a snapshot of `state` taken at `timestamp`.
    pub fn new(state: ExtendedState, timestamp: DateTime<Utc>) -> Self {
        Self {
            state,
            timestamp,
            event: None,
        }
    }

    /// Records the event that produced the snapshotted state.
    pub fn covering(mut self, event: ExtendedDomainEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Returns true if `stored`, the log entry at this snapshot's version,
    /// is the event the snapshot was taken after.
    ///
    /// Without a recorded event only the version is checked.
    pub fn is_covered_by(&self, stored: &ExtendedDomainEvent) -> bool {
        stored.version == self.version()
            && self.event.as_ref().is_none_or(|event| event == stored)
    }

    /// The aggregate this snapshot belongs to.
    pub fn aggregate_id(&self) -> &AggregateId {
        &self.state.id
    }

    /// Version of the last event covered by this snapshot.
    pub fn version(&self) -> Version {
        self.state.version
    }

    /// Returns the captured state.
    pub fn into_state(self) -> ExtendedState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DomainEvent, State};

    #[test]
    fn snapshot_exposes_id_and_version() {
        let id = AggregateId::generate("counter");
        let mut state = State::new("active", id.clone());
        state.set("count", 100);

        let snapshot = Snapshot::new(state.at_version(Version::new(100)), Utc::now());

        assert_eq!(snapshot.aggregate_id(), &id);
        assert_eq!(snapshot.version(), Version::new(100));
        assert_eq!(
            snapshot.into_state().get("count"),
            Some(&serde_json::json!(100))
        );
    }

    #[test]
    fn covering_event_must_match_the_log() {
        let id = AggregateId::generate("counter");
        let state = State::new("active", id.clone()).at_version(Version::new(3));
        let at = Utc::now();
        let incremented = DomainEvent::new("incremented", id.clone()).extend(Version::new(3), at);
        let closed = DomainEvent::new("closed", id.clone()).extend(Version::new(3), at);
        let later = DomainEvent::new("incremented", id).extend(Version::new(4), at);

        let snapshot = Snapshot::new(state.clone(), at).covering(incremented.clone());
        assert!(snapshot.is_covered_by(&incremented));
        assert!(!snapshot.is_covered_by(&closed));
        assert!(!snapshot.is_covered_by(&later));

        let bare = Snapshot::new(state, at);
        assert!(bare.is_covered_by(&closed));
        assert!(!bare.is_covered_by(&later));
    }

    #[test]
    fn snapshot_serialization_roundtrip() {
        let state = State::new("active", AggregateId::generate("counter"));
        let snapshot = Snapshot::new(state.at_version(Version::new(5)), Utc::now());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["version"], 5);
        assert!(json.get("timestamp").is_some());

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
