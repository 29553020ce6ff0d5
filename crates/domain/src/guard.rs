//! Command/event admission guards keyed by message type.

use std::collections::HashMap;

/// Whether the aggregate already exists when a message is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No stored state: the message would create the aggregate.
    Create,
    /// The aggregate exists in some state.
    Update,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Create => f.write_str("create"),
            Mode::Update => f.write_str("update"),
        }
    }
}

/// Maps a command or event type to the state types it is allowed in.
///
/// An empty map accepts everything. Otherwise a type mapped to an empty list
/// is a creator (accepted only in [`Mode::Create`]); a type mapped to a
/// non-empty list is accepted in [`Mode::Update`] when the current state type
/// is listed. Unlisted types are always rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardMap {
    allowed: HashMap<String, Vec<String>>,
}

impl GuardMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `message_type` as allowed in `state_types`; an empty slice
    /// marks it as a creator.
    pub fn allow<S: AsRef<str>>(&mut self, message_type: impl Into<String>, state_types: &[S]) {
        let entry = self.allowed.entry(message_type.into()).or_default();
        entry.extend(state_types.iter().map(|s| s.as_ref().to_string()));
    }

    /// Registers `message_type` as a creator.
    pub fn allow_creator(&mut self, message_type: impl Into<String>) {
        self.allowed.entry(message_type.into()).or_default();
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn accepts(&self, message_type: &str, state_type: &str, mode: Mode) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match (self.allowed.get(message_type), mode) {
            (None, _) => false,
            (Some(states), Mode::Create) => states.is_empty(),
            (Some(states), Mode::Update) => states.iter().any(|s| s == state_type),
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for GuardMap
where
    K: Into<String>,
    V: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let allowed = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
            .collect();
        Self { allowed }
    }
}
