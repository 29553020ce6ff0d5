pub mod error;
pub mod event;
pub mod memory;
pub mod snapshot;
pub mod state;
pub mod store;

pub use common::{AggregateId, Payload};
pub use error::{Result, StoreError};
pub use event::{DomainEvent, ExtendedDomainEvent, Version};
pub use memory::InMemoryEventStore;
pub use snapshot::Snapshot;
pub use state::{ExtendedState, State};
pub use store::{EventStore, EventStoreExt};
