use crate::ai::LlmError;
use crate::vector::VectorError;

/// 流水线和服务层共用的错误分型。
/// Conflict 表示乐观锁冲突，刷新重试即可；Gateway/Parse 记录在 job 上，不自动重试
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: record was modified concurrently")]
    Conflict,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("ai gateway error: {0}")]
    Gateway(#[from] LlmError),
    #[error("malformed ai response: {0}")]
    Parse(String),
    #[error("vector index error: {0}")]
    Index(#[from] VectorError),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
