pub mod chroma;
pub mod memory;
pub mod translate;

pub use chroma::ChromaStore;
pub use memory::MemoryVectorStore;
pub use translate::{TranslateStore, Translator};

use async_trait::async_trait;
use serde_json::{Map, Value};

pub const TABLE_DEF_COLLECTION: &str = "table_defs";
pub const COLUMN_DEF_COLLECTION: &str = "column_defs";
pub const DOC_DEF_COLLECTION: &str = "doc_defs";
pub const SQL_LOG_COLLECTION: &str = "sql_logs";

pub type Metadata = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum VectorError {
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 元数据过滤条件，删除必须按条件而不是按 id
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Self::In(field.to_string(), values)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    /// 渲染成 Chroma where 语法
    pub fn to_where(&self) -> Value {
        match self {
            Self::Eq(field, value) => {
                let mut op = Map::new();
                op.insert("$eq".to_string(), value.clone());
                let mut outer = Map::new();
                outer.insert(field.clone(), Value::Object(op));
                Value::Object(outer)
            }
            Self::In(field, values) => {
                let mut op = Map::new();
                op.insert("$in".to_string(), Value::Array(values.clone()));
                let mut outer = Map::new();
                outer.insert(field.clone(), Value::Object(op));
                Value::Object(outer)
            }
            Self::And(filters) => {
                let mut outer = Map::new();
                outer.insert(
                    "$and".to_string(),
                    Value::Array(filters.iter().map(Filter::to_where).collect()),
                );
                Value::Object(outer)
            }
        }
    }

    /// 本地求值，内存实现和测试用
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq(field, value) => metadata.get(field) == Some(value),
            Self::In(field, values) => metadata
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// 向量索引能力契约
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 以 doc_id 为键写入或覆盖一条文档
    async fn upsert(&self, doc_id: &str, document: &str, metadata: Metadata)
        -> Result<(), VectorError>;

    /// 语义检索，返回按相关度排序的元数据
    async fn query(
        &self,
        text: &str,
        top_n: u64,
        filter: Option<&Filter>,
    ) -> Result<Vec<Metadata>, VectorError>;

    /// 按元数据条件删除
    async fn delete_where(&self, filter: &Filter) -> Result<(), VectorError>;
}
