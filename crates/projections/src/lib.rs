//! Event side of the event-sourcing runtime.
//!
//! This crate provides:
//! - [`ReadModel`] and the [`ReadModelStore`] port with its filter model
//! - [`EventReactor`] bundles of policies and projections
//! - [`EventPipeline`] for prefetch, projection, persistence and policy dispatch
//! - [`EventBus`] and [`QueryBus`] routers
//! - [`InMemoryReadModelStore`] for tests and embedded hosts

pub mod bus;
pub mod filter;
pub mod memory;
pub mod processor;
pub mod query;
pub mod reactor;
pub mod read_model;

pub use bus::{EventBus, EventHandler};
pub use filter::{Condition, Direction, FindOptions, Operator, Range, Sort, Where};
pub use memory::InMemoryReadModelStore;
pub use processor::{EventPipeline, Reaction, persist};
pub use query::{Query, QueryBus, find_by_id};
pub use reactor::{
    EventReactor, PolicyFunction, ProjectionFunction, ProjectionTarget, ReactorBuilder,
    WhereFunction,
};
pub use read_model::{ReadModel, ReadModelStore};
