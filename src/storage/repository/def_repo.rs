use crate::storage::entity::{
    definition_column, definition_doc, definition_relation, definition_rule, definition_table,
};
use crate::storage::repository::now_ts;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

/// 关系类型取反：1-n 与 n-1 互换，其余不变
pub fn reverse_relation_type(relation_type: &str) -> &str {
    match relation_type {
        "1-n" => "n-1",
        "n-1" => "1-n",
        other => other,
    }
}

pub struct DefRepository;

impl DefRepository {
    /// 新增或更新表定义。注释变化才重新排队建索引，def_version 总是推进
    pub async fn upsert_table(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
        comment: Option<&str>,
        def_version: i32,
    ) -> Result<(), DbErr> {
        let table_name = table_name.trim();
        let comment = comment
            .map(|c| c.trim().trim_matches('"').to_string())
            .filter(|c| !c.is_empty());
        let now = now_ts();

        let existing = definition_table::Entity::find()
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::TableName.eq(table_name))
            .one(db)
            .await?;

        if let Some(existing) = existing {
            let mut update = definition_table::ActiveModel {
                id: Set(existing.id),
                def_version: Set(def_version),
                version: Set(existing.version + 1),
                updated_at: Set(now),
                ..Default::default()
            };
            if existing.comment != comment {
                update.comment = Set(comment);
                update.waiting = Set(true);
            }
            update.update(db).await?;
        } else {
            let model = definition_table::ActiveModel {
                project_id: Set(project_id),
                table_name: Set(table_name.to_string()),
                comment: Set(comment),
                ai_comment: Set(None),
                waiting: Set(true),
                def_version: Set(def_version),
                disabled: Set(false),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            model.insert(db).await?;
        }
        Ok(())
    }

    /// 新增或更新列定义
    pub async fn upsert_column(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
        column_name: &str,
        data_type: &str,
        comment: Option<&str>,
        def_version: i32,
    ) -> Result<(), DbErr> {
        let table_name = table_name.trim();
        let column_name = column_name.trim();
        let data_type = data_type.trim();
        let comment = comment
            .map(|c| c.trim().trim_matches('"').to_string())
            .filter(|c| !c.is_empty());
        let now = now_ts();

        let existing = definition_column::Entity::find()
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .filter(definition_column::Column::TableName.eq(table_name))
            .filter(definition_column::Column::ColumnName.eq(column_name))
            .one(db)
            .await?;

        if let Some(existing) = existing {
            let mut update = definition_column::ActiveModel {
                id: Set(existing.id),
                def_version: Set(def_version),
                version: Set(existing.version + 1),
                updated_at: Set(now),
                ..Default::default()
            };
            if existing.data_type != data_type || existing.comment != comment {
                update.data_type = Set(data_type.to_string());
                update.comment = Set(comment);
                update.waiting = Set(true);
            }
            update.update(db).await?;
        } else {
            let model = definition_column::ActiveModel {
                project_id: Set(project_id),
                table_name: Set(table_name.to_string()),
                column_name: Set(column_name.to_string()),
                data_type: Set(data_type.to_string()),
                comment: Set(comment),
                ai_comment: Set(None),
                waiting: Set(true),
                def_version: Set(def_version),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            model.insert(db).await?;
        }
        Ok(())
    }

    pub async fn find_table(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
    ) -> Result<Option<definition_table::Model>, DbErr> {
        definition_table::Entity::find()
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::TableName.eq(table_name))
            .one(db)
            .await
    }

    pub async fn all_tables(
        db: &DatabaseConnection,
        project_id: i32,
    ) -> Result<Vec<definition_table::Model>, DbErr> {
        definition_table::Entity::find()
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .order_by_asc(definition_table::Column::TableName)
            .all(db)
            .await
    }

    pub async fn all_columns(
        db: &DatabaseConnection,
        project_id: i32,
    ) -> Result<Vec<definition_column::Model>, DbErr> {
        definition_column::Entity::find()
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .order_by_asc(definition_column::Column::TableName)
            .order_by_asc(definition_column::Column::ColumnName)
            .all(db)
            .await
    }

    pub async fn columns_of_table(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
    ) -> Result<Vec<definition_column::Model>, DbErr> {
        definition_column::Entity::find()
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .filter(definition_column::Column::TableName.eq(table_name))
            .order_by_asc(definition_column::Column::ColumnName)
            .all(db)
            .await
    }

    pub async fn waiting_tables(
        db: &DatabaseConnection,
        limit: u64,
    ) -> Result<Vec<definition_table::Model>, DbErr> {
        definition_table::Entity::find()
            .filter(definition_table::Column::Waiting.eq(true))
            .order_by_asc(definition_table::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    pub async fn waiting_columns(
        db: &DatabaseConnection,
        limit: u64,
    ) -> Result<Vec<definition_column::Model>, DbErr> {
        definition_column::Entity::find()
            .filter(definition_column::Column::Waiting.eq(true))
            .order_by_asc(definition_column::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    pub async fn waiting_docs(
        db: &DatabaseConnection,
        limit: u64,
    ) -> Result<Vec<definition_doc::Model>, DbErr> {
        definition_doc::Entity::find()
            .filter(definition_doc::Column::Waiting.eq(true))
            .order_by_asc(definition_doc::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    /// 清除待同步标记。版本对不上说明同步期间又被编辑过，保留标记下轮重试
    pub async fn clear_table_waiting_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
    ) -> Result<bool, DbErr> {
        let res = definition_table::Entity::update_many()
            .col_expr(definition_table::Column::Waiting, Expr::value(false))
            .col_expr(
                definition_table::Column::Version,
                Expr::col(definition_table::Column::Version).add(1),
            )
            .col_expr(definition_table::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_table::Column::Id.eq(id))
            .filter(definition_table::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn clear_column_waiting_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
    ) -> Result<bool, DbErr> {
        let res = definition_column::Entity::update_many()
            .col_expr(definition_column::Column::Waiting, Expr::value(false))
            .col_expr(
                definition_column::Column::Version,
                Expr::col(definition_column::Column::Version).add(1),
            )
            .col_expr(definition_column::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_column::Column::Id.eq(id))
            .filter(definition_column::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn clear_doc_waiting_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
    ) -> Result<bool, DbErr> {
        let res = definition_doc::Entity::update_many()
            .col_expr(definition_doc::Column::Waiting, Expr::value(false))
            .col_expr(
                definition_doc::Column::Version,
                Expr::col(definition_doc::Column::Version).add(1),
            )
            .col_expr(definition_doc::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_doc::Column::Id.eq(id))
            .filter(definition_doc::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 落后于项目当前版本的表定义，等待清理
    pub async fn stale_tables(
        db: &DatabaseConnection,
        project_id: i32,
        cur_version: i32,
        limit: u64,
    ) -> Result<Vec<definition_table::Model>, DbErr> {
        definition_table::Entity::find()
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::DefVersion.lt(cur_version))
            .order_by_asc(definition_table::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    pub async fn stale_columns(
        db: &DatabaseConnection,
        project_id: i32,
        cur_version: i32,
        limit: u64,
    ) -> Result<Vec<definition_column::Model>, DbErr> {
        definition_column::Entity::find()
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .filter(definition_column::Column::DefVersion.lt(cur_version))
            .order_by_asc(definition_column::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    pub async fn delete_table_row(db: &DatabaseConnection, id: i32) -> Result<(), DbErr> {
        definition_table::Entity::delete_by_id(id).exec(db).await?;
        Ok(())
    }

    pub async fn delete_column_row(db: &DatabaseConnection, id: i32) -> Result<(), DbErr> {
        definition_column::Entity::delete_by_id(id).exec(db).await?;
        Ok(())
    }

    pub async fn set_table_disabled(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
        disabled: bool,
    ) -> Result<(), DbErr> {
        definition_table::Entity::update_many()
            .col_expr(definition_table::Column::Disabled, Expr::value(disabled))
            .col_expr(definition_table::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_table::Column::Version,
                Expr::col(definition_table::Column::Version).add(1),
            )
            .col_expr(definition_table::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::TableName.eq(table_name))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn update_table_ai_comment(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
        ai_comment: &str,
    ) -> Result<(), DbErr> {
        definition_table::Entity::update_many()
            .col_expr(
                definition_table::Column::AiComment,
                Expr::value(Some(ai_comment.to_string())),
            )
            .col_expr(definition_table::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_table::Column::Version,
                Expr::col(definition_table::Column::Version).add(1),
            )
            .col_expr(definition_table::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::TableName.eq(table_name))
            .exec(db)
            .await?;
        Ok(())
    }

    /// AI 注释没变就不更新，避免反复重建索引
    pub async fn update_column_ai_comment(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
        column_name: &str,
        ai_comment: &str,
    ) -> Result<(), DbErr> {
        let existing = definition_column::Entity::find()
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .filter(definition_column::Column::TableName.eq(table_name))
            .filter(definition_column::Column::ColumnName.eq(column_name))
            .one(db)
            .await?;
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.ai_comment.as_deref() == Some(ai_comment) {
            return Ok(());
        }
        definition_column::Entity::update_many()
            .col_expr(
                definition_column::Column::AiComment,
                Expr::value(Some(ai_comment.to_string())),
            )
            .col_expr(definition_column::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_column::Column::Version,
                Expr::col(definition_column::Column::Version).add(1),
            )
            .col_expr(definition_column::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_column::Column::Id.eq(existing.id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 重建索引：把当前版本的定义整体重新排队
    pub async fn mark_tables_waiting(
        db: &DatabaseConnection,
        project_id: i32,
        cur_version: i32,
    ) -> Result<u64, DbErr> {
        let res = definition_table::Entity::update_many()
            .col_expr(definition_table::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_table::Column::Version,
                Expr::col(definition_table::Column::Version).add(1),
            )
            .col_expr(definition_table::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_table::Column::ProjectId.eq(project_id))
            .filter(definition_table::Column::DefVersion.eq(cur_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn mark_columns_waiting(
        db: &DatabaseConnection,
        project_id: i32,
        cur_version: i32,
    ) -> Result<u64, DbErr> {
        let res = definition_column::Entity::update_many()
            .col_expr(definition_column::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_column::Column::Version,
                Expr::col(definition_column::Column::Version).add(1),
            )
            .col_expr(definition_column::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_column::Column::ProjectId.eq(project_id))
            .filter(definition_column::Column::DefVersion.eq(cur_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn mark_docs_waiting(
        db: &DatabaseConnection,
        project_id: i32,
    ) -> Result<u64, DbErr> {
        let res = definition_doc::Entity::update_many()
            .col_expr(definition_doc::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_doc::Column::Version,
                Expr::col(definition_doc::Column::Version).add(1),
            )
            .col_expr(definition_doc::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_doc::Column::ProjectId.eq(project_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    // ---- 文档定义 ----

    pub async fn insert_doc(
        db: &DatabaseConnection,
        project_id: i32,
        content: &str,
        default_selected: bool,
        disabled: bool,
    ) -> Result<definition_doc::Model, DbErr> {
        let now = now_ts();
        let model = definition_doc::ActiveModel {
            project_id: Set(project_id),
            content: Set(content.to_string()),
            default_selected: Set(default_selected),
            waiting: Set(true),
            disabled: Set(disabled),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await
    }

    pub async fn update_doc(
        db: &DatabaseConnection,
        id: i32,
        content: &str,
        default_selected: bool,
        disabled: bool,
    ) -> Result<(), DbErr> {
        definition_doc::Entity::update_many()
            .col_expr(definition_doc::Column::Content, Expr::value(content.to_string()))
            .col_expr(
                definition_doc::Column::DefaultSelected,
                Expr::value(default_selected),
            )
            .col_expr(definition_doc::Column::Disabled, Expr::value(disabled))
            .col_expr(definition_doc::Column::Waiting, Expr::value(true))
            .col_expr(
                definition_doc::Column::Version,
                Expr::col(definition_doc::Column::Version).add(1),
            )
            .col_expr(definition_doc::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_doc::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 删除文档定义，返回被删除的行供索引清理
    pub async fn delete_doc(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<definition_doc::Model>, DbErr> {
        let Some(doc) = definition_doc::Entity::find_by_id(id).one(db).await? else {
            return Ok(None);
        };
        definition_doc::Entity::delete_by_id(id).exec(db).await?;
        Ok(Some(doc))
    }

    pub async fn find_doc(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<definition_doc::Model>, DbErr> {
        definition_doc::Entity::find_by_id(id).one(db).await
    }

    pub async fn docs_by_ids(
        db: &DatabaseConnection,
        ids: &[i32],
    ) -> Result<Vec<definition_doc::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        definition_doc::Entity::find()
            .filter(definition_doc::Column::Id.is_in(ids.to_vec()))
            .order_by_asc(definition_doc::Column::Id)
            .all(db)
            .await
    }

    pub async fn default_selected_docs(
        db: &DatabaseConnection,
        project_id: i32,
    ) -> Result<Vec<definition_doc::Model>, DbErr> {
        definition_doc::Entity::find()
            .filter(definition_doc::Column::ProjectId.eq(project_id))
            .filter(definition_doc::Column::DefaultSelected.eq(true))
            .filter(definition_doc::Column::Disabled.eq(false))
            .order_by_asc(definition_doc::Column::Id)
            .all(db)
            .await
    }

    // ---- 规则定义 ----

    pub async fn rules_by_ids(
        db: &DatabaseConnection,
        ids: &[i32],
    ) -> Result<Vec<definition_rule::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        definition_rule::Entity::find()
            .filter(definition_rule::Column::Id.is_in(ids.to_vec()))
            .filter(definition_rule::Column::Disabled.eq(false))
            .order_by_asc(definition_rule::Column::Id)
            .all(db)
            .await
    }

    pub async fn insert_rule(
        db: &DatabaseConnection,
        project_id: i32,
        name: &str,
        content: &str,
        default_selected: bool,
    ) -> Result<definition_rule::Model, DbErr> {
        let now = now_ts();
        let model = definition_rule::ActiveModel {
            project_id: Set(project_id),
            name: Set(name.to_string()),
            content: Set(content.to_string()),
            default_selected: Set(default_selected),
            disabled: Set(false),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await
    }

    // ---- 关系定义 ----

    /// 新增或更新表关系。两表间的关系无方向，反向已存在时换算关系类型后更新
    pub async fn upsert_relation(
        db: &DatabaseConnection,
        project_id: i32,
        table1: &str,
        column1: &str,
        table2: &str,
        column2: &str,
        relation_type: &str,
    ) -> Result<(), DbErr> {
        let forward = definition_relation::Entity::find()
            .filter(definition_relation::Column::ProjectId.eq(project_id))
            .filter(definition_relation::Column::Table1.eq(table1))
            .filter(definition_relation::Column::Column1.eq(column1))
            .filter(definition_relation::Column::Table2.eq(table2))
            .filter(definition_relation::Column::Column2.eq(column2))
            .one(db)
            .await?;
        if let Some(forward) = forward {
            Self::set_relation_type(db, forward.id, relation_type).await?;
            return Ok(());
        }

        let reversed = definition_relation::Entity::find()
            .filter(definition_relation::Column::ProjectId.eq(project_id))
            .filter(definition_relation::Column::Table1.eq(table2))
            .filter(definition_relation::Column::Column1.eq(column2))
            .filter(definition_relation::Column::Table2.eq(table1))
            .filter(definition_relation::Column::Column2.eq(column1))
            .one(db)
            .await?;
        if let Some(reversed) = reversed {
            Self::set_relation_type(db, reversed.id, reverse_relation_type(relation_type)).await?;
            return Ok(());
        }

        let now = now_ts();
        let model = definition_relation::ActiveModel {
            project_id: Set(project_id),
            table1: Set(table1.to_string()),
            column1: Set(column1.to_string()),
            table2: Set(table2.to_string()),
            column2: Set(column2.to_string()),
            relation_type: Set(relation_type.to_string()),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await?;
        Ok(())
    }

    async fn set_relation_type(
        db: &DatabaseConnection,
        id: i32,
        relation_type: &str,
    ) -> Result<(), DbErr> {
        definition_relation::Entity::update_many()
            .col_expr(
                definition_relation::Column::RelationType,
                Expr::value(relation_type.to_string()),
            )
            .col_expr(
                definition_relation::Column::Version,
                Expr::col(definition_relation::Column::Version).add(1),
            )
            .col_expr(definition_relation::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(definition_relation::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 删除某张表参与的全部关系
    pub async fn delete_relations_of_table(
        db: &DatabaseConnection,
        project_id: i32,
        table_name: &str,
    ) -> Result<(), DbErr> {
        definition_relation::Entity::delete_many()
            .filter(definition_relation::Column::ProjectId.eq(project_id))
            .filter(definition_relation::Column::Table1.eq(table_name))
            .exec(db)
            .await?;
        definition_relation::Entity::delete_many()
            .filter(definition_relation::Column::ProjectId.eq(project_id))
            .filter(definition_relation::Column::Table2.eq(table_name))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 两端都在给定表集合内的关系
    pub async fn relations_between(
        db: &DatabaseConnection,
        project_id: i32,
        tables: &[String],
    ) -> Result<Vec<definition_relation::Model>, DbErr> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        definition_relation::Entity::find()
            .filter(definition_relation::Column::ProjectId.eq(project_id))
            .filter(definition_relation::Column::Table1.is_in(tables.to_vec()))
            .filter(definition_relation::Column::Table2.is_in(tables.to_vec()))
            .order_by_asc(definition_relation::Column::Id)
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_project, test_db};

    #[tokio::test]
    async fn upsert_table_rearms_waiting_only_on_change() {
        let db = test_db().await;
        let project = seed_project(&db).await;

        DefRepository::upsert_table(&db, project.id, "orders", Some("订单表"), 1)
            .await
            .unwrap();
        let t = DefRepository::find_table(&db, project.id, "orders")
            .await
            .unwrap()
            .unwrap();
        assert!(t.waiting);

        DefRepository::clear_table_waiting_guarded(&db, t.id, t.version)
            .await
            .unwrap();

        // 注释没变：只推进 def_version，不重新排队
        DefRepository::upsert_table(&db, project.id, "orders", Some("订单表"), 2)
            .await
            .unwrap();
        let t = DefRepository::find_table(&db, project.id, "orders")
            .await
            .unwrap()
            .unwrap();
        assert!(!t.waiting);
        assert_eq!(t.def_version, 2);

        // 注释变了：重新排队
        DefRepository::upsert_table(&db, project.id, "orders", Some("订单主表"), 3)
            .await
            .unwrap();
        let t = DefRepository::find_table(&db, project.id, "orders")
            .await
            .unwrap()
            .unwrap();
        assert!(t.waiting);
    }

    #[tokio::test]
    async fn upsert_relation_updates_reversed_pair() {
        let db = test_db().await;
        let project = seed_project(&db).await;

        DefRepository::upsert_relation(&db, project.id, "orders", "customer_id", "customers", "id", "n-1")
            .await
            .unwrap();
        // 反向出现同一对关系：不插入新行，换算类型后更新
        DefRepository::upsert_relation(&db, project.id, "customers", "id", "orders", "customer_id", "1-n")
            .await
            .unwrap();

        let relations = DefRepository::relations_between(
            &db,
            project.id,
            &["orders".to_string(), "customers".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].table1, "orders");
        assert_eq!(relations[0].relation_type, "n-1");
    }

    #[test]
    fn relation_type_reversal() {
        assert_eq!(reverse_relation_type("1-n"), "n-1");
        assert_eq!(reverse_relation_type("n-1"), "1-n");
        assert_eq!(reverse_relation_type("1-1"), "1-1");
        assert_eq!(reverse_relation_type("n-n"), "n-n");
    }
}
