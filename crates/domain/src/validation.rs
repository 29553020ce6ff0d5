//! Structural checks applied to commands and events before routing.

use common::{AggregateId, Payload};
use event_store::{DomainEvent, ExtendedDomainEvent, Version};
use serde_json::Value;

use crate::command::Command;
use crate::error::{Error, ErrorCode, Result};

/// Checks that the id has a type and a canonical UUID value.
pub fn validate_aggregate_id(id: &AggregateId) -> Result<()> {
    if id.aggregate_type.trim().is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidAggregateId,
            "aggregate id type must not be empty",
        ));
    }
    if !common::is_canonical_uuid(&id.value) {
        return Err(Error::new(
            ErrorCode::InvalidAggregateId,
            format!("aggregate id value '{}' is not a UUID", id.value),
        ));
    }
    Ok(())
}

/// A payload is either absent or an object with at least one key.
pub fn is_valid_payload(payload: Option<&Payload>) -> bool {
    payload.is_none_or(|p| !p.is_empty())
}

pub fn validate_command(command: &Command) -> Result<()> {
    if command.command_type.trim().is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidCommandType,
            "command type must not be empty",
        ));
    }
    validate_aggregate_id(&command.id)?;
    if !is_valid_payload(command.payload.as_ref()) {
        return Err(Error::new(
            ErrorCode::InvalidCommandPayload,
            format!("command '{}' has an empty payload", command.command_type),
        ));
    }
    Ok(())
}

pub fn validate_event(event: &DomainEvent) -> Result<()> {
    if event.event_type.trim().is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidEventType,
            "event type must not be empty",
        ));
    }
    validate_aggregate_id(&event.id)?;
    if !is_valid_payload(event.payload.as_ref()) {
        return Err(Error::new(
            ErrorCode::InvalidEventPayload,
            format!("event '{}' has an empty payload", event.event_type),
        ));
    }
    Ok(())
}

/// Validates a stored event, including its version (must be >= 1).
pub fn validate_extended_event(event: &ExtendedDomainEvent) -> Result<()> {
    validate_event(event)?;
    if event.version < Version::first() {
        return Err(Error::new(
            ErrorCode::InvalidEventVersion,
            format!("event '{}' has version {}", event.event_type, event.version),
        ));
    }
    Ok(())
}

/// Parses and validates an untyped command.
///
/// Anything that is not an object with a string `type` and an object `id`
/// fails with `INVALID_COMMAND`; a present payload that is not an object
/// fails with `INVALID_COMMAND_PAYLOAD`.
pub fn parse_command(value: Value) -> Result<Command> {
    let Value::Object(map) = &value else {
        return Err(Error::new(ErrorCode::InvalidCommand, "command must be an object"));
    };
    if !map.get("type").is_some_and(Value::is_string) {
        return Err(Error::new(
            ErrorCode::InvalidCommandType,
            "command type must be a string",
        ));
    }
    if !map.get("id").is_some_and(Value::is_object) {
        return Err(Error::new(
            ErrorCode::InvalidAggregateId,
            "command id must be an object",
        ));
    }
    if map.get("payload").is_some_and(|p| !p.is_object() && !p.is_null()) {
        return Err(Error::new(
            ErrorCode::InvalidCommandPayload,
            "command payload must be an object",
        ));
    }

    let command: Command = serde_json::from_value(value)
        .map_err(|e| Error::wrap(ErrorCode::InvalidCommand, "malformed command", e))?;
    validate_command(&command)?;
    Ok(command)
}

/// Parses and validates an untyped event; the `INVALID_EVENT*` counterpart of
/// [`parse_command`].
pub fn parse_event(value: Value) -> Result<DomainEvent> {
    let Value::Object(map) = &value else {
        return Err(Error::new(ErrorCode::InvalidEvent, "event must be an object"));
    };
    if !map.get("type").is_some_and(Value::is_string) {
        return Err(Error::new(
            ErrorCode::InvalidEventType,
            "event type must be a string",
        ));
    }
    if !map.get("id").is_some_and(Value::is_object) {
        return Err(Error::new(
            ErrorCode::InvalidAggregateId,
            "event id must be an object",
        ));
    }
    if map.get("payload").is_some_and(|p| !p.is_object() && !p.is_null()) {
        return Err(Error::new(
            ErrorCode::InvalidEventPayload,
            "event payload must be an object",
        ));
    }

    let event: DomainEvent = serde_json::from_value(value)
        .map_err(|e| Error::wrap(ErrorCode::InvalidEvent, "malformed event", e))?;
    validate_event(&event)?;
    Ok(event)
}
