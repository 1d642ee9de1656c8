use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 流水线阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum JobStage {
    #[sea_orm(string_value = "match_doc")]
    MatchDoc,
    #[sea_orm(string_value = "match_sql_log")]
    MatchSqlLog,
    #[sea_orm(string_value = "gen_related_columns")]
    GenRelatedColumns,
    #[sea_orm(string_value = "match_ddl")]
    MatchDdl,
    #[sea_orm(string_value = "generate_sql")]
    GenerateSql,
    #[sea_orm(string_value = "learn_from_sql")]
    LearnFromSql,
}

/// 任务状态：init -> running -> success/fail，init/running -> canceled
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum JobStatus {
    #[sea_orm(string_value = "init")]
    Init,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "fail")]
    Fail,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Canceled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub task_id: i32,
    pub stage: JobStage,
    pub status: JobStatus,
    /// 执行现场 JSON，如发出的 prompt
    pub job_data: Option<String>,
    pub error_message: Option<String>,
    pub cost_time_ms: i64,
    pub version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
