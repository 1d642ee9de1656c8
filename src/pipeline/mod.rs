pub mod context;
pub mod error;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod stages;

pub use error::PipelineError;
pub use runner::JobRunner;

use crate::ai::LlmProvider;
use crate::vector::VectorStore;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// 每类知识一个向量集合
#[derive(Clone)]
pub struct Stores {
    pub table_defs: Arc<dyn VectorStore>,
    pub column_defs: Arc<dyn VectorStore>,
    pub docs: Arc<dyn VectorStore>,
    pub sql_logs: Arc<dyn VectorStore>,
}

/// 各阶段共享的协作对象，进程内构造一次
pub struct PipelineContext {
    pub db: Arc<DatabaseConnection>,
    pub provider: Arc<dyn LlmProvider>,
    pub stores: Stores,
    pub model: String,
    pub temperature: f32,
}
