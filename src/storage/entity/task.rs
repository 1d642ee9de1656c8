use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub question: String,
    pub question_supplement: Option<String>,
    /// 任务选项 JSON，见 TaskOptions
    pub options: String,
    /// 规则 id 列表 JSON
    pub rules: Option<String>,
    /// AI 推断的相关表/字段 JSON
    pub related_columns: Option<String>,
    pub sql: Option<String>,
    pub sql_right: Option<bool>,
    pub sql_refer: Option<bool>,
    pub learn_result: Option<String>,
    /// 待写入向量索引
    pub index_waiting: bool,
    pub version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 控制流水线自动串联与匹配数量的选项，缺省字段取默认值
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskOptions {
    pub auto_match_sql_log: bool,
    pub auto_gen_related_columns: bool,
    #[serde(rename = "autoMatchDDL")]
    pub auto_match_ddl: bool,
    pub auto_gen_sql: bool,
    pub auto_learn_on_right: bool,
    pub match_doc_count: u64,
    pub match_sql_log_count: u64,
    pub match_ddl_table_count: u64,
    pub match_ddl_column_count: u64,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            auto_match_sql_log: false,
            auto_gen_related_columns: false,
            auto_match_ddl: false,
            auto_gen_sql: false,
            auto_learn_on_right: false,
            match_doc_count: 5,
            match_sql_log_count: 5,
            match_ddl_table_count: 5,
            match_ddl_column_count: 5,
        }
    }
}

impl Model {
    /// 解析 options 字段，解析失败按默认选项处理
    pub fn parse_options(&self) -> TaskOptions {
        serde_json::from_str(&self.options).unwrap_or_default()
    }

    /// 解析 rules 字段里的规则 id 列表
    pub fn parse_rule_ids(&self) -> Vec<i32> {
        self.rules
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}
