use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 任务引用的历史 SQL 记录（sql_id 指向另一条 Task）
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_sqls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub task_id: i32,
    pub sql_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
