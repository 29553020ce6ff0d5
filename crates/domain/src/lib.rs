//! Command side of the event-sourcing runtime.
//!
//! This crate provides:
//! - `Aggregate` definitions assembled from decide/reduce functions and guards
//! - `CommandPipeline` for replay, decide, reduce and optimistic-concurrency save
//! - `CommandBus` routing commands by aggregate type through a middleware chain
//! - The boundary `Error` with its string error codes

pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod draft;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod pipeline;
pub mod validation;

pub use aggregate::{Aggregate, AggregateBuilder, DecideFunction, PrepareFunction, ReduceFunction};
pub use bus::{CommandBus, CommandHandler};
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{Command, CommandReceipt};
pub use config::RuntimeConfig;
pub use context::Context;
pub use dispatcher::CommandDispatcher;
pub use draft::{Draft, Update};
pub use error::{BoxError, Error, ErrorCode, Result};
pub use guard::{GuardMap, Mode};
pub use middleware::{Handler, LoggingMiddleware, Message, Middleware, MiddlewareChain, Next};
pub use pipeline::{CommandPipeline, Replayed};
pub use validation::{
    parse_command, parse_event, validate_aggregate_id, validate_command, validate_event,
    validate_extended_event,
};
