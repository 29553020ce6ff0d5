//! Shared identifier types used by every layer of the runtime.

mod types;

pub use types::{AggregateId, Payload, is_canonical_uuid};
