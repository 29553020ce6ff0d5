//! Cascading command dispatch.
//!
//! Policies in the event pipelines only enqueue commands; this crate provides
//! the [`CommandQueue`] they enqueue into and the [`CascadeCoordinator`]
//! that feeds queued commands back through the command bus and the resulting
//! events through the event bus, up to a fixed number of steps.

pub mod coordinator;
pub mod queue;

pub use coordinator::{CascadeCoordinator, CascadeReport};
pub use queue::CommandQueue;
