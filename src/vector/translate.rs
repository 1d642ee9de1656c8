use crate::vector::{Filter, Metadata, VectorError, VectorStore};
use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// Azure 文本翻译客户端。没配 key 时 is_active 为 false，整层翻译被旁路
pub struct Translator {
    client: reqwest::Client,
    subscription_key: Option<String>,
    endpoint: String,
    location: String,
}

impl Translator {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            subscription_key: std::env::var("AZURE_TRANSLATOR_KEY").ok(),
            endpoint: std::env::var("AZURE_TRANSLATOR_ENDPOINT")
                .unwrap_or_else(|_| "https://api.cognitive.microsofttranslator.com".to_string()),
            location: std::env::var("AZURE_TRANSLATOR_LOCATION")
                .unwrap_or_else(|_| "global".to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription_key.is_some()
    }

    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String, VectorError> {
        let Some(key) = self.subscription_key.as_deref() else {
            return Ok(text.to_string());
        };
        let url = format!("{}/translate", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!([{ "text": text }]);
        let resp = self
            .client
            .post(&url)
            .query(&[("api-version", "3.0"), ("to", target_lang)])
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Ocp-Apim-Subscription-Region", &self.location)
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
        v.get(0)
            .and_then(|x| x.get("translations"))
            .and_then(|x| x.get(0))
            .and_then(|x| x.get("text"))
            .and_then(|x| x.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| VectorError::InvalidResponse(format!("missing translation, raw={raw}")))
    }
}

/// 写入和检索前把文本翻译成目标语言的装饰层。
/// 翻译失败显式回退原文并记日志，绝不把错误抛给流水线
pub struct TranslateStore {
    inner: Arc<dyn VectorStore>,
    translator: Arc<Translator>,
    target_lang: String,
}

impl TranslateStore {
    pub fn new(inner: Arc<dyn VectorStore>, translator: Arc<Translator>, target_lang: &str) -> Self {
        Self {
            inner,
            translator,
            target_lang: target_lang.to_string(),
        }
    }

    async fn translate_or_original(&self, text: &str) -> String {
        if !self.translator.is_active() {
            return text.to_string();
        }
        match self.translator.translate(text, &self.target_lang).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("翻译失败，使用原文: {}", e);
                text.to_string()
            }
        }
    }
}

#[async_trait]
impl VectorStore for TranslateStore {
    async fn upsert(
        &self,
        doc_id: &str,
        document: &str,
        metadata: Metadata,
    ) -> Result<(), VectorError> {
        let translated = self.translate_or_original(document).await;
        self.inner.upsert(doc_id, &translated, metadata).await
    }

    async fn query(
        &self,
        text: &str,
        top_n: u64,
        filter: Option<&Filter>,
    ) -> Result<Vec<Metadata>, VectorError> {
        let translated = self.translate_or_original(text).await;
        self.inner.query(&translated, top_n, filter).await
    }

    async fn delete_where(&self, filter: &Filter) -> Result<(), VectorError> {
        self.inner.delete_where(filter).await
    }
}
