use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AggregateId, Payload, Version};

/// Keys owned by the runtime; they never live in `State::fields`.
const RESERVED_KEYS: [&str; 4] = ["type", "id", "version", "timestamp"];

/// Aggregate state as produced by reducers.
///
/// `state_type` is the state-machine tag the command/event guards match on
/// (e.g. "active", "closed"); `fields` holds everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "type")]
    pub state_type: String,

    pub id: AggregateId,

    #[serde(flatten)]
    pub fields: Payload,
}

impl State {
    /// Creates an empty state with the given type tag.
    pub fn new(state_type: impl Into<String>, id: AggregateId) -> Self {
        Self {
            state_type: state_type.into(),
            id,
            fields: Payload::new(),
        }
    }

    /// The provisional state of an aggregate with no backing events.
    ///
    /// Its type tag is the aggregate type.
    pub fn provisional(id: AggregateId) -> Self {
        Self::new(id.aggregate_type.clone(), id)
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Builds a state from a replacement object returned by a reducer.
    ///
    /// `type` and `id` are taken from the object when present and otherwise
    /// inherited from `base`; `version`/`timestamp` keys are dropped. Returns
    /// `None` if `value` is not an object or carries a malformed `type`/`id`.
    pub fn from_replacement(base: &State, value: Value) -> Option<State> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let state_type = match map.remove("type") {
            None => base.state_type.clone(),
            Some(Value::String(s)) => s,
            Some(_) => return None,
        };
        let id = match map.remove("id") {
            None => base.id.clone(),
            Some(raw) => serde_json::from_value(raw).ok()?,
        };
        for key in RESERVED_KEYS {
            map.remove(key);
        }

        Some(State {
            state_type,
            id,
            fields: map,
        })
    }

    /// Attaches a version to this state.
    pub fn at_version(self, version: Version) -> ExtendedState {
        ExtendedState {
            state: self,
            version,
        }
    }
}

/// State together with the version of the last event folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedState {
    #[serde(flatten)]
    pub state: State,

    pub version: Version,
}

impl ExtendedState {
    /// The version-0 state of an aggregate that does not exist yet.
    pub fn provisional(id: AggregateId) -> Self {
        State::provisional(id).at_version(Version::initial())
    }

    /// True while no event has been saved for this aggregate.
    pub fn is_provisional(&self) -> bool {
        self.version == Version::initial()
    }

    pub fn into_inner(self) -> State {
        self.state
    }
}

impl Deref for ExtendedState {
    type Target = State;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for ExtendedState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provisional_state_uses_aggregate_type() {
        let id = AggregateId::generate("counter");
        let state = ExtendedState::provisional(id.clone());
        assert!(state.is_provisional());
        assert_eq!(state.state_type, "counter");
        assert_eq!(state.id, id);
    }

    #[test]
    fn replacement_inherits_type_and_id() {
        let id = AggregateId::generate("counter");
        let base = State::new("active", id.clone());

        let replaced = State::from_replacement(&base, json!({"count": 3})).unwrap();
        assert_eq!(replaced.state_type, "active");
        assert_eq!(replaced.id, id);
        assert_eq!(replaced.get("count"), Some(&json!(3)));
    }

    #[test]
    fn replacement_can_change_type_and_drops_reserved_keys() {
        let base = State::new("active", AggregateId::generate("counter"));

        let replaced =
            State::from_replacement(&base, json!({"type": "closed", "version": 9})).unwrap();
        assert_eq!(replaced.state_type, "closed");
        assert!(replaced.get("version").is_none());
    }

    #[test]
    fn replacement_rejects_non_objects() {
        let base = State::new("active", AggregateId::generate("counter"));
        assert!(State::from_replacement(&base, json!(42)).is_none());
        assert!(State::from_replacement(&base, json!({"type": 1})).is_none());
    }

    #[test]
    fn extended_state_serializes_flat() {
        let mut state = State::new("active", AggregateId::generate("counter"));
        state.set("count", 6);
        let extended = state.at_version(Version::new(2));

        let json = serde_json::to_value(&extended).unwrap();
        assert_eq!(json["type"], "active");
        assert_eq!(json["count"], 6);
        assert_eq!(json["version"], 2);

        let back: ExtendedState = serde_json::from_value(json).unwrap();
        assert_eq!(back, extended);
    }
}
