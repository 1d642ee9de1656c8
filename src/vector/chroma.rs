use crate::vector::{Filter, Metadata, VectorError, VectorStore};
use async_trait::async_trait;
use log::info;
use serde_json::Value;
use tokio::sync::OnceCell;

/// Chroma REST 客户端，每个集合一个实例。集合 id 首次使用时 get_or_create 并缓存
pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(base_url: &str, collection: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            collection_id: OnceCell::new(),
        }
    }

    async fn collection_id(&self) -> Result<&str, VectorError> {
        self.collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections", self.base_url);
                let body = serde_json::json!({
                    "name": self.collection,
                    "get_or_create": true,
                });
                let resp = self
                    .client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| VectorError::Http(e.to_string()))?;
                let status = resp.status();
                let raw = resp
                    .text()
                    .await
                    .map_err(|e| VectorError::Http(e.to_string()))?;
                if !status.is_success() {
                    return Err(VectorError::Http(format!("{} {}", status.as_u16(), raw)));
                }
                let v: Value = serde_json::from_str(&raw)
                    .map_err(|e| VectorError::InvalidResponse(format!("{e}, raw={raw}")))?;
                let id = v
                    .get("id")
                    .and_then(|x| x.as_str())
                    .ok_or_else(|| {
                        VectorError::InvalidResponse(format!("missing collection id, raw={raw}"))
                    })?
                    .to_string();
                info!("已连接向量集合 {} ({})", self.collection, id);
                Ok(id)
            })
            .await
            .map(|s| s.as_str())
    }

    async fn post(&self, action: &str, body: &Value) -> Result<Value, VectorError> {
        let collection_id = self.collection_id().await?;
        let url = format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, collection_id, action
        );
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| VectorError::Http(e.to_string()))?;
        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| VectorError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(VectorError::Http(format!("{} {}", status.as_u16(), raw)));
        }
        serde_json::from_str(&raw)
            .map_err(|e| VectorError::InvalidResponse(format!("{e}, raw={raw}")))
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(
        &self,
        doc_id: &str,
        document: &str,
        metadata: Metadata,
    ) -> Result<(), VectorError> {
        let body = serde_json::json!({
            "ids": [doc_id],
            "documents": [document],
            "metadatas": [metadata],
        });
        self.post("upsert", &body).await?;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_n: u64,
        filter: Option<&Filter>,
    ) -> Result<Vec<Metadata>, VectorError> {
        let mut body = serde_json::json!({
            "query_texts": [text],
            "n_results": top_n,
            "include": ["metadatas"],
        });
        if let Some(filter) = filter {
            body["where"] = filter.to_where();
        }
        let v = self.post("query", &body).await?;
        // 返回结构：metadatas 是按查询文本分组的二维数组，取第一组
        let metadatas = v
            .get("metadatas")
            .and_then(|m| m.get(0))
            .and_then(|m| m.as_array())
            .ok_or_else(|| VectorError::InvalidResponse(format!("missing metadatas: {v}")))?;
        Ok(metadatas
            .iter()
            .filter_map(|m| m.as_object().cloned())
            .collect())
    }

    async fn delete_where(&self, filter: &Filter) -> Result<(), VectorError> {
        let body = serde_json::json!({ "where": filter.to_where() });
        self.post("delete", &body).await?;
        Ok(())
    }
}
