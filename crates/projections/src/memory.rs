use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::filter::FindOptions;
use crate::read_model::{ReadModel, ReadModelStore};

/// In-memory read-model store for tests and embedded hosts.
///
/// Models are grouped by type and ordered by id, so unsorted queries return
/// them in id order.
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    models: Arc<RwLock<HashMap<String, BTreeMap<String, ReadModel>>>>,
}

impl InMemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many models of `model_type` are stored.
    pub async fn count(&self, model_type: &str) -> usize {
        self.models
            .read()
            .await
            .get(model_type)
            .map_or(0, BTreeMap::len)
    }

    /// Returns every stored model of `model_type`, ordered by id.
    pub async fn all(&self, model_type: &str) -> Vec<ReadModel> {
        self.models
            .read()
            .await
            .get(model_type)
            .map(|models| models.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn clear(&self) {
        self.models.write().await.clear();
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModelStore {
    async fn find_many(
        &self,
        model_type: &str,
        options: &FindOptions,
    ) -> event_store::Result<Vec<ReadModel>> {
        let models = self.models.read().await;
        let candidates = models
            .get(model_type)
            .map(|models| models.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(options.apply(candidates))
    }

    async fn find_by_id(&self, model_type: &str, id: &str) -> event_store::Result<Option<ReadModel>> {
        Ok(self
            .models
            .read()
            .await
            .get(model_type)
            .and_then(|models| models.get(id))
            .cloned())
    }

    async fn save(&self, model: ReadModel) -> event_store::Result<()> {
        self.models
            .write()
            .await
            .entry(model.model_type.clone())
            .or_default()
            .insert(model.id.clone(), model);
        Ok(())
    }

    async fn delete(&self, model: &ReadModel) -> event_store::Result<()> {
        if let Some(models) = self.models.write().await.get_mut(&model.model_type) {
            models.remove(&model.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Condition, Operator, Sort};
    use serde_json::json;

    async fn seeded() -> InMemoryReadModelStore {
        let store = InMemoryReadModelStore::new();
        for (id, qty) in [("c", 3), ("a", 1), ("b", 2)] {
            store
                .save(ReadModel::new("item", id).with_json(json!({ "qty": qty })))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn save_upserts_by_key() {
        let store = InMemoryReadModelStore::new();
        store
            .save(ReadModel::new("item", "a").with_json(json!({"qty": 1})))
            .await
            .unwrap();
        store
            .save(ReadModel::new("item", "a").with_json(json!({"qty": 2})))
            .await
            .unwrap();

        assert_eq!(store.count("item").await, 1);
        let found = store.find_by_id("item", "a").await.unwrap().unwrap();
        assert_eq!(found.get("qty"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn find_by_id_is_scoped_by_type() {
        let store = seeded().await;
        assert!(store.find_by_id("item", "a").await.unwrap().is_some());
        assert!(store.find_by_id("order", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_many_applies_options() {
        let store = seeded().await;

        let all = store.find_many("item", &FindOptions::new()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let options = FindOptions::new()
            .filter(Condition::new("qty", Operator::Gte, 2))
            .sort(Sort::desc("qty"));
        let found = store.find_many("item", &options).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = seeded().await;
        let model = ReadModel::new("item", "a");

        store.delete(&model).await.unwrap();
        store.delete(&model).await.unwrap();
        store.delete(&ReadModel::new("unknown", "x")).await.unwrap();

        assert_eq!(store.count("item").await, 2);
    }
}
