//! Middleware chains wrapping bus handlers.
//!
//! A chain runs its middleware outermost-first; each one receives the
//! message and a [`Next`] continuation that invokes the rest of the chain and
//! finally the handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::AggregateId;
use event_store::ExtendedDomainEvent;
use futures_util::future::BoxFuture;

use crate::command::Command;
use crate::context::Context;
use crate::error::Result;

/// Continuation invoking the remainder of a chain.
pub type Next<M, O> = Box<dyn FnOnce(Context, M) -> BoxFuture<'static, Result<O>> + Send>;

/// Terminal handler at the end of a chain.
pub type Handler<M, O> = Arc<dyn Fn(Context, M) -> BoxFuture<'static, Result<O>> + Send + Sync>;

/// Wraps the handling of messages of type `M` producing `O`.
#[async_trait]
pub trait Middleware<M, O>: Send + Sync {
    /// Processes `message`, usually by calling `next` exactly once.
    async fn handle(&self, ctx: Context, message: M, next: Next<M, O>) -> Result<O>;
}

/// Ordered list of middleware around a handler.
pub struct MiddlewareChain<M, O> {
    middlewares: Arc<Vec<Arc<dyn Middleware<M, O>>>>,
}

impl<M, O> MiddlewareChain<M, O>
where
    M: Send + 'static,
    O: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Appends `middleware`; it runs inside every middleware added before it.
    pub fn push<W: Middleware<M, O> + 'static>(&mut self, middleware: W) {
        let mut middlewares = (*self.middlewares).clone();
        middlewares.push(Arc::new(middleware));
        self.middlewares = Arc::new(middlewares);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `message` through every middleware and then `handler`.
    pub async fn apply(&self, ctx: Context, message: M, handler: Handler<M, O>) -> Result<O> {
        self.execute_from(0, ctx, message, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        ctx: Context,
        message: M,
        handler: Handler<M, O>,
    ) -> BoxFuture<'static, Result<O>> {
        let Some(middleware) = self.middlewares.get(index).cloned() else {
            tracing::trace!("middleware chain complete, calling handler");
            return handler(ctx, message);
        };

        let chain = self.clone();
        tracing::trace!(middleware_index = index, "executing middleware");
        Box::pin(async move {
            let next: Next<M, O> = Box::new(move |ctx: Context, message: M| {
                chain.execute_from(index + 1, ctx, message, handler)
            });
            middleware.handle(ctx, message, next).await
        })
    }
}

impl<M, O> Clone for MiddlewareChain<M, O> {
    fn clone(&self) -> Self {
        Self {
            middlewares: Arc::clone(&self.middlewares),
        }
    }
}

impl<M, O> Default for MiddlewareChain<M, O>
where
    M: Send + 'static,
    O: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A routed message: something with a type and a target aggregate.
pub trait Message {
    fn message_type(&self) -> &str;
    fn aggregate_id(&self) -> &AggregateId;
}

impl Message for Command {
    fn message_type(&self) -> &str {
        &self.command_type
    }

    fn aggregate_id(&self) -> &AggregateId {
        &self.id
    }
}

impl Message for ExtendedDomainEvent {
    fn message_type(&self) -> &str {
        &self.event_type
    }

    fn aggregate_id(&self) -> &AggregateId {
        &self.id
    }
}

/// Logs every message passing through a bus together with its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl<M, O> Middleware<M, O> for LoggingMiddleware
where
    M: Message + Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, ctx: Context, message: M, next: Next<M, O>) -> Result<O> {
        let message_type = message.message_type().to_string();
        let aggregate_id = message.aggregate_id().to_string();
        let correlation_id = ctx.correlation_id.clone().unwrap_or_default();
        let started = Instant::now();

        tracing::info!(%message_type, %aggregate_id, %correlation_id, "handling message");
        let result = next(ctx, message).await;
        let elapsed_ms = saturating_millis(started.elapsed());

        match &result {
            Ok(_) => tracing::info!(%message_type, %aggregate_id, elapsed_ms, "message handled"),
            Err(e) => tracing::warn!(
                %message_type,
                %aggregate_id,
                elapsed_ms,
                code = %e.code(),
                error = %e,
                "message failed"
            ),
        }
        result
    }
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
fn saturating_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
