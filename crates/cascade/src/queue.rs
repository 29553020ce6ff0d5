//! A command dispatcher that queues commands for the cascade loop.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{BoxError, Command, CommandDispatcher, Context};
use tokio::sync::Mutex;

/// FIFO of commands issued by policies, each with the context it was
/// issued under.
#[derive(Clone, Default)]
pub struct CommandQueue {
    pending: Arc<Mutex<VecDeque<(Context, Command)>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, ctx: Context, command: Command) {
        self.pending.lock().await.push_back((ctx, command));
    }

    pub async fn pop(&self) -> Option<(Context, Command)> {
        self.pending.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Drops every pending command, returning how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

#[async_trait]
impl CommandDispatcher for CommandQueue {
    async fn dispatch(&self, ctx: &Context, command: Command) -> Result<(), BoxError> {
        self.push(ctx.clone(), command).await;
        Ok(())
    }
}
