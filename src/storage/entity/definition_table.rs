use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "definition_tables")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub table_name: String,
    pub comment: Option<String>,
    pub ai_comment: Option<String>,
    /// 待写入向量索引
    pub waiting: bool,
    /// 记录所属的 DDL 导入版本，落后于 Project.cur_version 时被清理
    pub def_version: i32,
    pub disabled: bool,
    pub version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
