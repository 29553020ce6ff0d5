//! Boundary error type shared by pipelines and buses.
//!
//! Failures are classified by a closed set of string codes rather than by
//! error type; the underlying cause, when there is one, stays reachable
//! through [`std::error::Error::source`].

use thiserror::Error;

/// Error returned by user-supplied functions (decide, reduce, policy, ...).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification code of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidCommand,
    InvalidCommandType,
    InvalidCommandPayload,
    InvalidAggregateId,
    CommandHandlerNotFound,
    CommandNotAccepted,
    CommandPrepareFailed,
    EventDeciderError,
    EventNotAccepted,
    ReducerReturnedVoid,
    NoEventsStored,
    SnapshotCannotBeLoaded,
    EventsCannotBeLoaded,
    VersionMismatch,
    EventVersionConflict,
    LastEventVersionCannotBeLoaded,
    SnapshotCannotBeSaved,
    EventsCannotBeSaved,
    InvalidEvent,
    InvalidEventType,
    InvalidEventPayload,
    InvalidEventVersion,
    EventHandlerNotFound,
    ReadModelFetchFailed,
    ReadModelNotFound,
    InvalidReadModel,
    InvalidReadModelType,
    InvalidReadModelId,
    ProjectionExecutionFailed,
    SaveViewFailed,
    ModelSaveFailed,
    PolicyExecutionFailed,
    CommandDispatchFailed,
    QueryHandlerNotFound,
    QueryExecutionFailed,
    CascadeLimitExceeded,
    InvalidBuilderConfiguration,
}

impl ErrorCode {
    /// The wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidCommand => "INVALID_COMMAND",
            ErrorCode::InvalidCommandType => "INVALID_COMMAND_TYPE",
            ErrorCode::InvalidCommandPayload => "INVALID_COMMAND_PAYLOAD",
            ErrorCode::InvalidAggregateId => "INVALID_AGGREGATE_ID",
            ErrorCode::CommandHandlerNotFound => "COMMAND_HANDLER_NOT_FOUND",
            ErrorCode::CommandNotAccepted => "COMMAND_NOT_ACCEPTED",
            ErrorCode::CommandPrepareFailed => "COMMAND_PREPARE_FAILED",
            ErrorCode::EventDeciderError => "EVENT_DECIDER_ERROR",
            ErrorCode::EventNotAccepted => "EVENT_NOT_ACCEPTED",
            ErrorCode::ReducerReturnedVoid => "REDUCER_RETURNED_VOID",
            ErrorCode::NoEventsStored => "NO_EVENTS_STORED",
            ErrorCode::SnapshotCannotBeLoaded => "SNAPSHOT_CANNOT_BE_LOADED",
            ErrorCode::EventsCannotBeLoaded => "EVENTS_CANNOT_BE_LOADED",
            ErrorCode::VersionMismatch => "VERSION_MISMATCH",
            ErrorCode::EventVersionConflict => "EVENT_VERSION_CONFLICT",
            ErrorCode::LastEventVersionCannotBeLoaded => "LAST_EVENT_VERSION_CANNOT_BE_LOADED",
            ErrorCode::SnapshotCannotBeSaved => "SNAPSHOT_CANNOT_BE_SAVED",
            ErrorCode::EventsCannotBeSaved => "EVENTS_CANNOT_BE_SAVED",
            ErrorCode::InvalidEvent => "INVALID_EVENT",
            ErrorCode::InvalidEventType => "INVALID_EVENT_TYPE",
            ErrorCode::InvalidEventPayload => "INVALID_EVENT_PAYLOAD",
            ErrorCode::InvalidEventVersion => "INVALID_EVENT_VERSION",
            ErrorCode::EventHandlerNotFound => "EVENT_HANDLER_NOT_FOUND",
            ErrorCode::ReadModelFetchFailed => "READ_MODEL_FETCH_FAILED",
            ErrorCode::ReadModelNotFound => "READ_MODEL_NOT_FOUND",
            ErrorCode::InvalidReadModel => "INVALID_READ_MODEL",
            ErrorCode::InvalidReadModelType => "INVALID_READ_MODEL_TYPE",
            ErrorCode::InvalidReadModelId => "INVALID_READ_MODEL_ID",
            ErrorCode::ProjectionExecutionFailed => "PROJECTION_EXECUTION_FAILED",
            ErrorCode::SaveViewFailed => "SAVE_VIEW_FAILED",
            ErrorCode::ModelSaveFailed => "MODEL_SAVE_FAILED",
            ErrorCode::PolicyExecutionFailed => "POLICY_EXECUTION_FAILED",
            ErrorCode::CommandDispatchFailed => "COMMAND_DISPATCH_FAILED",
            ErrorCode::QueryHandlerNotFound => "QUERY_HANDLER_NOT_FOUND",
            ErrorCode::QueryExecutionFailed => "QUERY_EXECUTION_FAILED",
            ErrorCode::CascadeLimitExceeded => "CASCADE_LIMIT_EXCEEDED",
            ErrorCode::InvalidBuilderConfiguration => "INVALID_BUILDER_CONFIGURATION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified runtime failure.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error without an underlying cause.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error that keeps `source` as its cause.
    pub fn wrap(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error carries `code`.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Code of the nearest boundary error in the cause chain, if any.
    pub fn cause_code(&self) -> Option<ErrorCode> {
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            if let Some(inner) = err.downcast_ref::<Error>() {
                return Some(inner.code);
            }
            cause = err.source();
        }
        None
    }
}

/// Result type for pipeline and bus operations.
pub type Result<T> = std::result::Result<T, Error>;
