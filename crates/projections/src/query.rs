//! Query bus: resolves named queries against the read-model store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use common::Payload;
use domain::{BoxError, Context, Error, ErrorCode, Result};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::read_model::{ReadModel, ReadModelStore};

/// A named read request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type")]
    pub query_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Query {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            payload: None,
        }
    }

    pub fn with_json(mut self, payload: Value) -> Self {
        if let Value::Object(map) = payload {
            self.payload = Some(map);
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }
}

type ResolverFuture = BoxFuture<'static, std::result::Result<Value, BoxError>>;

type Resolver = Box<dyn Fn(Context, Query, Arc<dyn ReadModelStore>) -> ResolverFuture + Send + Sync>;

/// Routes queries by type to their resolver.
pub struct QueryBus {
    store: Arc<dyn ReadModelStore>,
    resolvers: HashMap<String, Resolver>,
}

impl QueryBus {
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self {
            store,
            resolvers: HashMap::new(),
        }
    }

    /// Registers the resolver for `query_type`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, query_type: impl Into<String>, resolver: F)
    where
        F: Fn(Context, Query, Arc<dyn ReadModelStore>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
    {
        self.resolvers.insert(
            query_type.into(),
            Box::new(
                move |ctx: Context, query: Query, store: Arc<dyn ReadModelStore>| -> ResolverFuture {
                    Box::pin(resolver(ctx, query, store))
                },
            ),
        );
    }

    #[tracing::instrument(skip(self, ctx, query), fields(query_type = %query.query_type))]
    pub async fn execute(&self, ctx: Context, query: Query) -> Result<Value> {
        let resolver = self.resolvers.get(&query.query_type).ok_or_else(|| {
            Error::new(
                ErrorCode::QueryHandlerNotFound,
                format!("no resolver registered for query '{}'", query.query_type),
            )
        })?;

        let query_type = query.query_type.clone();
        resolver(ctx, query, Arc::clone(&self.store))
            .await
            .map_err(|e| {
                Error::wrap(
                    ErrorCode::QueryExecutionFailed,
                    format!("query '{query_type}' failed"),
                    e,
                )
            })
    }
}

/// Loads one read model, failing with `READ_MODEL_NOT_FOUND` when absent.
pub async fn find_by_id<R: ReadModelStore + ?Sized>(
    store: &R,
    model_type: &str,
    id: &str,
) -> Result<ReadModel> {
    store
        .find_by_id(model_type, id)
        .await
        .map_err(|e| {
            Error::wrap(
                ErrorCode::ReadModelFetchFailed,
                format!("read model {model_type}:{id} cannot be fetched"),
                e,
            )
        })?
        .ok_or_else(|| {
            Error::new(
                ErrorCode::ReadModelNotFound,
                format!("read model {model_type}:{id} not found"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Condition, FindOptions};
    use crate::memory::InMemoryReadModelStore;
    use serde_json::json;

    async fn bus() -> QueryBus {
        let store = InMemoryReadModelStore::new();
        store
            .save(ReadModel::new("summary", "a").with_json(json!({"status": "open"})))
            .await
            .unwrap();
        store
            .save(ReadModel::new("summary", "b").with_json(json!({"status": "closed"})))
            .await
            .unwrap();

        let mut bus = QueryBus::new(Arc::new(store));
        bus.register("summaryById", |_, query, store| async move {
            let id = query.field("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let model = find_by_id(store.as_ref(), "summary", &id).await?;
            Ok::<_, BoxError>(serde_json::to_value(model)?)
        });
        bus.register("openSummaries", |_, _, store| async move {
            let options = FindOptions::new().filter(Condition::eq("status", "open"));
            let models = store.find_many("summary", &options).await?;
            Ok::<_, BoxError>(serde_json::to_value(models)?)
        });
        bus
    }

    #[tokio::test]
    async fn resolves_registered_queries() {
        let bus = bus().await;

        let found = bus
            .execute(Context::new(), Query::new("summaryById").with_json(json!({"id": "a"})))
            .await
            .unwrap();
        assert_eq!(found, json!({"type": "summary", "id": "a", "status": "open"}));

        let open = bus
            .execute(Context::new(), Query::new("openSummaries"))
            .await
            .unwrap();
        assert_eq!(open.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_queries_are_rejected() {
        let bus = bus().await;
        let err = bus
            .execute(Context::new(), Query::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::QueryHandlerNotFound);
    }

    #[tokio::test]
    async fn resolver_failures_keep_their_cause() {
        let bus = bus().await;
        let err = bus
            .execute(Context::new(), Query::new("summaryById").with_json(json!({"id": "zzz"})))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::QueryExecutionFailed);
        assert_eq!(err.cause_code(), Some(ErrorCode::ReadModelNotFound));
    }
}
