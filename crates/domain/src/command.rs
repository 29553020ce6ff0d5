//! Command messages and command pipeline results.

use common::{AggregateId, Payload};
use event_store::Version;
use serde::{Deserialize, Serialize};

/// An intention to change an aggregate.
///
/// `payload`, when present, must be a non-empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,

    /// The aggregate this command targets.
    pub id: AggregateId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Command {
    /// Creates a command without a payload.
    pub fn new(command_type: impl Into<String>, id: AggregateId) -> Self {
        Self {
            command_type: command_type.into(),
            id,
            payload: None,
        }
    }

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
}

/// Result of a successfully handled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReceipt {
    /// The aggregate the command was applied to.
    pub id: AggregateId,

    /// Version of the event appended for this command.
    pub version: Version,
}
