use crate::vector::{Filter, Metadata, VectorError, VectorStore};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub struct StoredDoc {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// 进程内的朴素实现：没配外部索引时兜底，检索按词面重合度排序。
/// 仅适合小数据量和测试，语义相似度远不如真实向量库
#[derive(Default)]
pub struct MemoryVectorStore {
    docs: Mutex<Vec<StoredDoc>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc_id: &str) -> Option<StoredDoc> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == doc_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn score(query: &str, document: &str) -> usize {
        let doc = document.to_lowercase();
        query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| doc.contains(*w))
            .count()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(
        &self,
        doc_id: &str,
        document: &str,
        metadata: Metadata,
    ) -> Result<(), VectorError> {
        let mut docs = self.docs.lock().unwrap();
        docs.retain(|d| d.id != doc_id);
        docs.push(StoredDoc {
            id: doc_id.to_string(),
            document: document.to_string(),
            metadata,
        });
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_n: u64,
        filter: Option<&Filter>,
    ) -> Result<Vec<Metadata>, VectorError> {
        let docs = self.docs.lock().unwrap();
        let mut hits: Vec<(usize, &StoredDoc)> = docs
            .iter()
            .filter(|d| filter.map(|f| f.matches(&d.metadata)).unwrap_or(true))
            .map(|d| (Self::score(text, &d.document), d))
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits
            .into_iter()
            .take(top_n as usize)
            .map(|(_, d)| d.metadata.clone())
            .collect())
    }

    async fn delete_where(&self, filter: &Filter) -> Result<(), VectorError> {
        self.docs
            .lock()
            .unwrap()
            .retain(|d| !filter.matches(&d.metadata));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let store = MemoryVectorStore::new();
        store.upsert("1", "old", meta(&[("a", json!(1))])).await.unwrap();
        store.upsert("1", "new", meta(&[("a", json!(2))])).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().document, "new");
    }

    #[tokio::test]
    async fn query_filters_and_ranks() {
        let store = MemoryVectorStore::new();
        store
            .upsert("1", "customer orders table", meta(&[("project_id", json!(1))]))
            .await
            .unwrap();
        store
            .upsert("2", "inventory table", meta(&[("project_id", json!(1))]))
            .await
            .unwrap();
        store
            .upsert("3", "customer orders table", meta(&[("project_id", json!(2))]))
            .await
            .unwrap();

        let filter = Filter::eq("project_id", 1);
        let hits = store
            .query("customer orders", 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        // 命中词多的排前面
        assert_eq!(hits[0].get("project_id"), Some(&json!(1)));

        let hits = store.query("customer orders", 1, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn delete_where_removes_only_matches() {
        let store = MemoryVectorStore::new();
        store
            .upsert("1", "a", meta(&[("version", json!(1))]))
            .await
            .unwrap();
        store
            .upsert("2", "b", meta(&[("version", json!(2))]))
            .await
            .unwrap();

        store.delete_where(&Filter::eq("version", 1)).await.unwrap();
        assert!(store.get("1").is_none());
        assert!(store.get("2").is_some());
    }
}
