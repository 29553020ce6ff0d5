//! Outbound port for commands issued by policies.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Command;
use crate::context::Context;
use crate::error::BoxError;

/// Accepts commands for later execution.
///
/// Dispatch is fire-and-forget from the caller's point of view: returning
/// `Ok` only means the command was accepted, not that it was handled.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, ctx: &Context, command: Command) -> Result<(), BoxError>;
}

#[async_trait]
impl<T: CommandDispatcher + ?Sized> CommandDispatcher for Arc<T> {
    async fn dispatch(&self, ctx: &Context, command: Command) -> Result<(), BoxError> {
        (**self).dispatch(ctx, command).await
    }
}
