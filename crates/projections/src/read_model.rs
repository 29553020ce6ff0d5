//! Read models and the storage port they live in.

use async_trait::async_trait;
use common::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::FindOptions;

/// A denormalized view keyed by `(model_type, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadModel {
    #[serde(rename = "type")]
    pub model_type: String,

    pub id: String,

    #[serde(flatten)]
    pub fields: Payload,
}

impl ReadModel {
    pub fn new(model_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            id: id.into(),
            fields: Payload::new(),
        }
    }

    /// Sets fields from a JSON object; other values are ignored.
    pub fn with_json(mut self, fields: Value) -> Self {
        if let Value::Object(map) = fields {
            for (key, value) in map {
                if key != "type" && key != "id" {
                    self.fields.insert(key, value);
                }
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Reads a field for filtering and sorting; `type` and `id` resolve to
    /// the key columns.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "type" => Some(Value::String(self.model_type.clone())),
            "id" => Some(Value::String(self.id.clone())),
            _ => self.fields.get(key).cloned(),
        }
    }

    /// True if `other` has the same `(type, id)` key.
    pub fn same_key(&self, other: &ReadModel) -> bool {
        self.model_type == other.model_type && self.id == other.id
    }

    /// Builds a model from a replacement object returned by a projection.
    ///
    /// `type` and `id` default to those of `base`. Returns `None` if `value`
    /// is not an object or carries a non-string `type`/`id`.
    pub fn from_replacement(base: &ReadModel, value: Value) -> Option<ReadModel> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let model_type = match map.remove("type") {
            None => base.model_type.clone(),
            Some(Value::String(s)) => s,
            Some(_) => return None,
        };
        let id = match map.remove("id") {
            None => base.id.clone(),
            Some(Value::String(s)) => s,
            Some(_) => return None,
        };
        Some(ReadModel {
            model_type,
            id,
            fields: map,
        })
    }
}

/// Keyed, queryable store of read models, injected by the host.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Returns the models of `model_type` matching `options`: filtered, then
    /// sorted, then windowed by the range.
    async fn find_many(
        &self,
        model_type: &str,
        options: &FindOptions,
    ) -> event_store::Result<Vec<ReadModel>>;

    async fn find_by_id(&self, model_type: &str, id: &str) -> event_store::Result<Option<ReadModel>>;

    /// Inserts or replaces the model with the same key.
    async fn save(&self, model: ReadModel) -> event_store::Result<()>;

    /// Removes the model with the same key; a missing model is not an error.
    async fn delete(&self, model: &ReadModel) -> event_store::Result<()>;
}

#[async_trait]
impl<T: ReadModelStore + ?Sized> ReadModelStore for std::sync::Arc<T> {
    async fn find_many(
        &self,
        model_type: &str,
        options: &FindOptions,
    ) -> event_store::Result<Vec<ReadModel>> {
        (**self).find_many(model_type, options).await
    }

    async fn find_by_id(&self, model_type: &str, id: &str) -> event_store::Result<Option<ReadModel>> {
        (**self).find_by_id(model_type, id).await
    }

    async fn save(&self, model: ReadModel) -> event_store::Result<()> {
        (**self).save(model).await
    }

    async fn delete(&self, model: &ReadModel) -> event_store::Result<()> {
        (**self).delete(model).await
    }
}
