use crate::storage::entity::task::{self, ActiveModel as TaskActiveModel, Entity as Task};
use crate::storage::entity::{job, task_column, task_doc, task_sql, task_table, TaskOptions};
use crate::storage::repository::now_ts;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

pub struct TaskRepository;

impl TaskRepository {
    pub async fn create(
        db: &DatabaseConnection,
        project_id: i32,
        question: &str,
        question_supplement: Option<&str>,
        options: &TaskOptions,
        rules: Option<&[i32]>,
    ) -> Result<task::Model, DbErr> {
        let now = now_ts();
        let model = TaskActiveModel {
            project_id: Set(project_id),
            question: Set(question.to_string()),
            question_supplement: Set(question_supplement.map(|s| s.to_string())),
            options: Set(serde_json::to_string(options)
                .map_err(|e| DbErr::Custom(format!("serialize options: {}", e)))?),
            rules: Set(rules.map(|r| serde_json::to_string(r).unwrap_or_else(|_| "[]".into()))),
            related_columns: Set(None),
            sql: Set(None),
            sql_right: Set(None),
            sql_refer: Set(None),
            learn_result: Set(None),
            index_waiting: Set(false),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await
    }

    pub async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<task::Model>, DbErr> {
        Task::find_by_id(id).one(db).await
    }

    pub async fn find_by_ids(
        db: &DatabaseConnection,
        ids: &[i32],
    ) -> Result<Vec<task::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Task::find()
            .filter(task::Column::Id.is_in(ids.to_vec()))
            .order_by_asc(task::Column::Id)
            .all(db)
            .await
    }

    /// 带版本校验的字段更新，版本不一致返回 false 且不落任何修改
    async fn set_field_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
        column: task::Column,
        value: Option<String>,
    ) -> Result<bool, DbErr> {
        let res = Task::update_many()
            .col_expr(column, Expr::value(value))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn set_related_columns_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
        value: &str,
    ) -> Result<bool, DbErr> {
        Self::set_field_guarded(
            db,
            id,
            read_version,
            task::Column::RelatedColumns,
            Some(value.to_string()),
        )
        .await
    }

    pub async fn set_sql_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
        sql: &str,
    ) -> Result<bool, DbErr> {
        Self::set_field_guarded(db, id, read_version, task::Column::Sql, Some(sql.to_string()))
            .await
    }

    pub async fn set_learn_result_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
        value: &str,
    ) -> Result<bool, DbErr> {
        Self::set_field_guarded(
            db,
            id,
            read_version,
            task::Column::LearnResult,
            Some(value.to_string()),
        )
        .await
    }

    /// 带版本校验批量写入选中文档，整体成功或整体放弃
    pub async fn insert_docs_guarded(
        db: &DatabaseConnection,
        task: &task::Model,
        read_version: i32,
        doc_ids: &[i32],
    ) -> Result<bool, DbErr> {
        let txn = db.begin().await?;
        if !Self::bump_guarded(&txn, task.id, read_version).await? {
            txn.rollback().await?;
            return Ok(false);
        }
        let rows: Vec<task_doc::ActiveModel> = doc_ids
            .iter()
            .map(|doc_id| task_doc::ActiveModel {
                project_id: Set(task.project_id),
                task_id: Set(task.id),
                doc_id: Set(*doc_id),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            task_doc::Entity::insert_many(rows).exec(&txn).await?;
        }
        txn.commit().await?;
        Ok(true)
    }

    /// 带版本校验批量写入引用的历史 SQL
    pub async fn insert_sqls_guarded(
        db: &DatabaseConnection,
        task: &task::Model,
        read_version: i32,
        sql_ids: &[i32],
    ) -> Result<bool, DbErr> {
        let txn = db.begin().await?;
        if !Self::bump_guarded(&txn, task.id, read_version).await? {
            txn.rollback().await?;
            return Ok(false);
        }
        let rows: Vec<task_sql::ActiveModel> = sql_ids
            .iter()
            .map(|sql_id| task_sql::ActiveModel {
                project_id: Set(task.project_id),
                task_id: Set(task.id),
                sql_id: Set(*sql_id),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            task_sql::Entity::insert_many(rows).exec(&txn).await?;
        }
        txn.commit().await?;
        Ok(true)
    }

    /// 带版本校验批量写入选中的表和列
    pub async fn insert_selection_guarded(
        db: &DatabaseConnection,
        task: &task::Model,
        read_version: i32,
        tables: &[String],
        columns: &[(String, String)],
    ) -> Result<bool, DbErr> {
        let txn = db.begin().await?;
        if !Self::bump_guarded(&txn, task.id, read_version).await? {
            txn.rollback().await?;
            return Ok(false);
        }
        Self::insert_selection(&txn, task.project_id, task.id, tables, columns).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn bump_guarded<C: ConnectionTrait>(
        conn: &C,
        task_id: i32,
        read_version: i32,
    ) -> Result<bool, DbErr> {
        let res = Task::update_many()
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .filter(task::Column::Version.eq(read_version))
            .exec(conn)
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn insert_selection<C: ConnectionTrait>(
        conn: &C,
        project_id: i32,
        task_id: i32,
        tables: &[String],
        columns: &[(String, String)],
    ) -> Result<(), DbErr> {
        let table_rows: Vec<task_table::ActiveModel> = tables
            .iter()
            .map(|t| task_table::ActiveModel {
                project_id: Set(project_id),
                task_id: Set(task_id),
                table_name: Set(t.clone()),
                ..Default::default()
            })
            .collect();
        if !table_rows.is_empty() {
            task_table::Entity::insert_many(table_rows).exec(conn).await?;
        }
        let column_rows: Vec<task_column::ActiveModel> = columns
            .iter()
            .map(|(t, c)| task_column::ActiveModel {
                project_id: Set(project_id),
                task_id: Set(task_id),
                table_name: Set(t.clone()),
                column_name: Set(c.clone()),
                ..Default::default()
            })
            .collect();
        if !column_rows.is_empty() {
            task_column::Entity::insert_many(column_rows).exec(conn).await?;
        }
        Ok(())
    }

    /// 同步路径：整体替换选中的表和列
    pub async fn update_selected_columns(
        db: &DatabaseConnection,
        task_id: i32,
        selections: &[(String, Vec<String>)],
    ) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        let Some(task) = Task::find_by_id(task_id).one(&txn).await? else {
            txn.rollback().await?;
            return Err(DbErr::RecordNotFound(format!("task {} not found", task_id)));
        };
        task_table::Entity::delete_many()
            .filter(task_table::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task_column::Entity::delete_many()
            .filter(task_column::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        let tables: Vec<String> = {
            let mut seen = std::collections::BTreeSet::new();
            selections
                .iter()
                .filter(|(t, _)| seen.insert(t.clone()))
                .map(|(t, _)| t.clone())
                .collect()
        };
        let columns: Vec<(String, String)> = selections
            .iter()
            .flat_map(|(t, cols)| cols.iter().map(move |c| (t.clone(), c.clone())))
            .collect();
        Self::insert_selection(&txn, task.project_id, task_id, &tables, &columns).await?;
        Self::bump(&txn, task_id).await?;
        txn.commit().await?;
        Ok(())
    }

    /// 同步路径：整体替换选中文档
    pub async fn update_selected_docs(
        db: &DatabaseConnection,
        task_id: i32,
        doc_ids: &[i32],
    ) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        let Some(task) = Task::find_by_id(task_id).one(&txn).await? else {
            txn.rollback().await?;
            return Err(DbErr::RecordNotFound(format!("task {} not found", task_id)));
        };
        task_doc::Entity::delete_many()
            .filter(task_doc::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        let rows: Vec<task_doc::ActiveModel> = doc_ids
            .iter()
            .map(|doc_id| task_doc::ActiveModel {
                project_id: Set(task.project_id),
                task_id: Set(task_id),
                doc_id: Set(*doc_id),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            task_doc::Entity::insert_many(rows).exec(&txn).await?;
        }
        Self::bump(&txn, task_id).await?;
        txn.commit().await?;
        Ok(())
    }

    /// 同步路径：整体替换引用的历史 SQL
    pub async fn update_selected_sqls(
        db: &DatabaseConnection,
        task_id: i32,
        sql_ids: &[i32],
    ) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        let Some(task) = Task::find_by_id(task_id).one(&txn).await? else {
            txn.rollback().await?;
            return Err(DbErr::RecordNotFound(format!("task {} not found", task_id)));
        };
        task_sql::Entity::delete_many()
            .filter(task_sql::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        let rows: Vec<task_sql::ActiveModel> = sql_ids
            .iter()
            .map(|sql_id| task_sql::ActiveModel {
                project_id: Set(task.project_id),
                task_id: Set(task_id),
                sql_id: Set(*sql_id),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            task_sql::Entity::insert_many(rows).exec(&txn).await?;
        }
        Self::bump(&txn, task_id).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn bump<C: ConnectionTrait>(conn: &C, task_id: i32) -> Result<(), DbErr> {
        Task::update_many()
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub async fn update_question(
        db: &DatabaseConnection,
        task_id: i32,
        question: &str,
        question_supplement: Option<&str>,
    ) -> Result<(), DbErr> {
        Task::update_many()
            .col_expr(task::Column::Question, Expr::value(question.to_string()))
            .col_expr(
                task::Column::QuestionSupplement,
                Expr::value(question_supplement.map(|s| s.to_string())),
            )
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn update_sql(db: &DatabaseConnection, task_id: i32, sql: &str) -> Result<(), DbErr> {
        Task::update_many()
            .col_expr(task::Column::Sql, Expr::value(Some(sql.to_string())))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 记录 SQL 反馈并标记待重建索引
    pub async fn set_feedback(
        db: &DatabaseConnection,
        task_id: i32,
        sql_right: Option<bool>,
        sql_refer: Option<bool>,
    ) -> Result<(), DbErr> {
        Task::update_many()
            .col_expr(task::Column::SqlRight, Expr::value(sql_right))
            .col_expr(task::Column::SqlRefer, Expr::value(sql_refer))
            .col_expr(task::Column::IndexWaiting, Expr::value(true))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 重新生成前清除反馈标记
    pub async fn clear_feedback(db: &DatabaseConnection, task_id: i32) -> Result<(), DbErr> {
        Task::update_many()
            .col_expr(task::Column::SqlRight, Expr::value(Option::<bool>::None))
            .col_expr(task::Column::SqlRefer, Expr::value(Option::<bool>::None))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(task_id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn tables_of(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<Vec<task_table::Model>, DbErr> {
        task_table::Entity::find()
            .filter(task_table::Column::TaskId.eq(task_id))
            .order_by_asc(task_table::Column::Id)
            .all(db)
            .await
    }

    pub async fn columns_of(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<Vec<task_column::Model>, DbErr> {
        task_column::Entity::find()
            .filter(task_column::Column::TaskId.eq(task_id))
            .order_by_asc(task_column::Column::Id)
            .all(db)
            .await
    }

    pub async fn docs_of(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<Vec<task_doc::Model>, DbErr> {
        task_doc::Entity::find()
            .filter(task_doc::Column::TaskId.eq(task_id))
            .order_by_asc(task_doc::Column::Id)
            .all(db)
            .await
    }

    pub async fn sqls_of(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<Vec<task_sql::Model>, DbErr> {
        task_sql::Entity::find()
            .filter(task_sql::Column::TaskId.eq(task_id))
            .order_by_asc(task_sql::Column::Id)
            .all(db)
            .await
    }

    /// 待同步到向量索引的任务批次
    pub async fn waiting_batch(
        db: &DatabaseConnection,
        limit: u64,
    ) -> Result<Vec<task::Model>, DbErr> {
        Task::find()
            .filter(task::Column::IndexWaiting.eq(true))
            .order_by_asc(task::Column::Id)
            .limit(limit)
            .all(db)
            .await
    }

    /// 清除待同步标记。带版本校验：同步期间记录又被改过则保留标记，下个周期重试
    pub async fn clear_index_waiting_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
    ) -> Result<bool, DbErr> {
        let res = Task::update_many()
            .col_expr(task::Column::IndexWaiting, Expr::value(false))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 重建 SQL 索引：把可参考的任务整体重新排队
    pub async fn mark_refer_tasks_waiting(
        db: &DatabaseConnection,
        project_id: i32,
    ) -> Result<u64, DbErr> {
        let res = Task::update_many()
            .col_expr(task::Column::IndexWaiting, Expr::value(true))
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(task::Column::ProjectId.eq(project_id))
            .filter(task::Column::SqlRefer.eq(true))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 删除任务及其全部子记录和 job 历史
    pub async fn delete_cascade(db: &DatabaseConnection, task_id: i32) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        Task::delete_by_id(task_id).exec(&txn).await?;
        job::Entity::delete_many()
            .filter(job::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task_doc::Entity::delete_many()
            .filter(task_doc::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task_sql::Entity::delete_many()
            .filter(task_sql::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task_table::Entity::delete_many()
            .filter(task_table::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task_column::Entity::delete_many()
            .filter(task_column::Column::TaskId.eq(task_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::TaskOptions;
    use crate::test_support::{seed_project, seed_task, test_db};

    #[tokio::test]
    async fn guarded_update_rejects_stale_version() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let read_version = task.version;

        // 模拟同步路径在外部调用期间改过任务
        TaskRepository::update_question(&db, task.id, "改过的问题", None)
            .await
            .unwrap();

        let applied = TaskRepository::set_sql_guarded(&db, task.id, read_version, "SELECT 1")
            .await
            .unwrap();
        assert!(!applied);

        let after = TaskRepository::find(&db, task.id).await.unwrap().unwrap();
        assert_eq!(after.sql, None);
        assert_eq!(after.version, read_version + 1); // 只有同步路径那次修改
    }

    #[tokio::test]
    async fn guarded_insert_docs_rolls_back_on_conflict() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let read_version = task.version;

        TaskRepository::update_question(&db, task.id, "改过的问题", None)
            .await
            .unwrap();

        let applied = TaskRepository::insert_docs_guarded(&db, &task, read_version, &[1, 2, 3])
            .await
            .unwrap();
        assert!(!applied);
        assert!(TaskRepository::docs_of(&db, task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn version_advances_once_per_mutation() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        assert_eq!(task.version, 0);

        TaskRepository::update_sql(&db, task.id, "SELECT 1").await.unwrap();
        TaskRepository::set_feedback(&db, task.id, Some(true), Some(false))
            .await
            .unwrap();

        let after = TaskRepository::find(&db, task.id).await.unwrap().unwrap();
        assert_eq!(after.version, 2);
        assert!(after.index_waiting);
    }

    #[tokio::test]
    async fn update_selected_columns_replaces_children() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        TaskRepository::update_selected_columns(
            &db,
            task.id,
            &[("orders".to_string(), vec!["id".to_string(), "amount".to_string()])],
        )
        .await
        .unwrap();
        TaskRepository::update_selected_columns(
            &db,
            task.id,
            &[("customers".to_string(), vec!["id".to_string()])],
        )
        .await
        .unwrap();

        let tables = TaskRepository::tables_of(&db, task.id).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_name, "customers");
        let columns = TaskRepository::columns_of(&db, task.id).await.unwrap();
        assert_eq!(columns.len(), 1);
    }
}
