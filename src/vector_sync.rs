//! 向量索引与定义记录的后台对账：把变更过的记录刷进索引、清掉被新版本取代的记录。
//! 两个扫描都幂等，重推已同步的记录或重删已删除的记录都是空操作，
//! 外部写入和标记清理之间崩溃也只会在下个周期重来一遍

use crate::pipeline::{PipelineError, Stores};
use crate::storage::entity::{definition_column, definition_doc, definition_table, task};
use crate::storage::repository::{DefRepository, ProjectRepository, TaskRepository};
use crate::vector::{Filter, Metadata};
use log::info;
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;

/// 刷新扫描每类每轮最多处理的条数
pub const SYNC_BATCH: u64 = 10;
/// 清理扫描每类每轮最多处理的条数
pub const PURGE_BATCH: u64 = 50;

pub struct VectorSyncService {
    db: Arc<DatabaseConnection>,
    stores: Stores,
}

impl VectorSyncService {
    pub fn new(db: Arc<DatabaseConnection>, stores: Stores) -> Self {
        Self { db, stores }
    }

    /// 刷新扫描：把 waiting 的记录推进索引再清标记。
    /// 标记清理带版本校验，同步途中被编辑过的记录保留标记等下轮重推
    pub async fn sync_pending(&self) -> Result<(), PipelineError> {
        let db = self.db.as_ref();

        let mut table_count = 0usize;
        for def in DefRepository::waiting_tables(db, SYNC_BATCH).await? {
            self.push_table(&def).await?;
            DefRepository::clear_table_waiting_guarded(db, def.id, def.version).await?;
            table_count += 1;
        }
        if table_count > 0 {
            info!("已写入向量索引的表定义: {}", table_count);
        }

        let mut column_count = 0usize;
        for def in DefRepository::waiting_columns(db, SYNC_BATCH).await? {
            self.push_column(&def).await?;
            DefRepository::clear_column_waiting_guarded(db, def.id, def.version).await?;
            column_count += 1;
        }
        if column_count > 0 {
            info!("已写入向量索引的列定义: {}", column_count);
        }

        let mut doc_count = 0usize;
        for doc in DefRepository::waiting_docs(db, SYNC_BATCH).await? {
            self.push_doc(&doc).await?;
            DefRepository::clear_doc_waiting_guarded(db, doc.id, doc.version).await?;
            doc_count += 1;
        }
        if doc_count > 0 {
            info!("已写入向量索引的文档定义: {}", doc_count);
        }

        let mut task_count = 0usize;
        for task in TaskRepository::waiting_batch(db, SYNC_BATCH).await? {
            self.push_task(&task).await?;
            TaskRepository::clear_index_waiting_guarded(db, task.id, task.version).await?;
            task_count += 1;
        }
        if task_count > 0 {
            info!("已写入向量索引的任务: {}", task_count);
        }

        Ok(())
    }

    /// 清理扫描：def_version 落后于项目当前版本的定义，
    /// 先按 项目 + 自然键 + 版本 的条件删索引（绝不能只按 id，免得误删复用 id 的新记录），再删行
    pub async fn purge_stale(&self) -> Result<(), PipelineError> {
        let db = self.db.as_ref();
        let mut table_count = 0usize;
        let mut column_count = 0usize;

        for project in ProjectRepository::all(db).await? {
            for def in
                DefRepository::stale_tables(db, project.id, project.cur_version, PURGE_BATCH).await?
            {
                let filter = Filter::and(vec![
                    Filter::eq("project_id", def.project_id),
                    Filter::eq("table", def.table_name.clone()),
                    Filter::eq("version", def.def_version),
                ]);
                self.stores.table_defs.delete_where(&filter).await?;
                DefRepository::delete_table_row(db, def.id).await?;
                table_count += 1;
            }

            for def in
                DefRepository::stale_columns(db, project.id, project.cur_version, PURGE_BATCH)
                    .await?
            {
                let filter = Filter::and(vec![
                    Filter::eq("project_id", def.project_id),
                    Filter::eq("table", def.table_name.clone()),
                    Filter::eq("column", def.column_name.clone()),
                    Filter::eq("version", def.def_version),
                ]);
                self.stores.column_defs.delete_where(&filter).await?;
                DefRepository::delete_column_row(db, def.id).await?;
                column_count += 1;
            }
        }

        if table_count > 0 {
            info!("已清理旧版本表定义: {}", table_count);
        }
        if column_count > 0 {
            info!("已清理旧版本列定义: {}", column_count);
        }
        Ok(())
    }

    /// 索引文本优先级：AI 注释 > 人工注释 > 原始名称，取第一个非空
    fn index_text(ai_comment: &Option<String>, comment: &Option<String>, fallback: &str) -> String {
        ai_comment
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| comment.clone().filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| fallback.to_string())
    }

    async fn push_table(&self, def: &definition_table::Model) -> Result<(), PipelineError> {
        let text = Self::index_text(&def.ai_comment, &def.comment, &def.table_name);
        let document = format!("Table: {}\nDescription: {}", def.table_name, text);
        let metadata: Metadata = [
            ("project_id".to_string(), json!(def.project_id)),
            ("table".to_string(), json!(def.table_name)),
            ("version".to_string(), json!(def.def_version)),
            ("disabled".to_string(), json!(def.disabled)),
        ]
        .into_iter()
        .collect();
        self.stores
            .table_defs
            .upsert(&def.id.to_string(), &document, metadata)
            .await?;
        Ok(())
    }

    async fn push_column(&self, def: &definition_column::Model) -> Result<(), PipelineError> {
        let text = Self::index_text(&def.ai_comment, &def.comment, &def.column_name);
        let document = format!(
            "Table: {}\nColumn: {}\nDescription: {}",
            def.table_name, def.column_name, text
        );
        let metadata: Metadata = [
            ("project_id".to_string(), json!(def.project_id)),
            ("table".to_string(), json!(def.table_name)),
            ("column".to_string(), json!(def.column_name)),
            ("data_type".to_string(), json!(def.data_type)),
            ("version".to_string(), json!(def.def_version)),
        ]
        .into_iter()
        .collect();
        self.stores
            .column_defs
            .upsert(&def.id.to_string(), &document, metadata)
            .await?;
        Ok(())
    }

    async fn push_doc(&self, doc: &definition_doc::Model) -> Result<(), PipelineError> {
        let metadata: Metadata = [
            ("project_id".to_string(), json!(doc.project_id)),
            ("id".to_string(), json!(doc.id)),
            ("content".to_string(), json!(doc.content)),
            ("default_selected".to_string(), json!(doc.default_selected)),
            ("disabled".to_string(), json!(doc.disabled)),
        ]
        .into_iter()
        .collect();
        self.stores
            .docs
            .upsert(&doc.id.to_string(), &doc.content, metadata)
            .await?;
        Ok(())
    }

    /// 可参考的任务按问题入索引；参考标记被取消的任务从索引移除
    async fn push_task(&self, task: &task::Model) -> Result<(), PipelineError> {
        if task.sql_refer == Some(true) {
            let metadata: Metadata = [
                ("project_id".to_string(), json!(task.project_id)),
                ("task_id".to_string(), json!(task.id)),
                ("question".to_string(), json!(task.question)),
                ("sql".to_string(), json!(task.sql)),
            ]
            .into_iter()
            .collect();
            self.stores
                .sql_logs
                .upsert(&task.id.to_string(), &task.question, metadata)
                .await?;
        } else {
            self.stores
                .sql_logs
                .delete_where(&Filter::eq("task_id", task.id))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::TaskOptions;
    use crate::test_support::{seed_project, seed_task, test_db, test_sync};
    use crate::vector::VectorStore;

    #[tokio::test]
    async fn sync_processes_at_most_one_batch_per_tick() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        for i in 0..12 {
            DefRepository::upsert_table(&db, project.id, &format!("table_{:02}", i), None, 1)
                .await
                .unwrap();
        }

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();

        sync.sync_pending().await.unwrap();
        assert_eq!(stores.table_defs.len(), 10);
        assert_eq!(DefRepository::waiting_tables(db, 100).await.unwrap().len(), 2);

        sync.sync_pending().await.unwrap();
        assert_eq!(stores.table_defs.len(), 12);
        assert!(DefRepository::waiting_tables(db, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_text_prefers_ai_comment_over_comment_over_name() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        DefRepository::upsert_table(&db, project.id, "orders", Some("orders table"), 1)
            .await
            .unwrap();

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();

        sync.sync_pending().await.unwrap();
        let def = DefRepository::find_table(db, project.id, "orders").await.unwrap().unwrap();
        let doc = stores.table_defs.get(&def.id.to_string()).unwrap();
        assert!(doc.document.contains("orders table"));

        // 补上 AI 注释后重推，索引文本换成 AI 注释
        DefRepository::update_table_ai_comment(db, project.id, "orders", "Customer orders")
            .await
            .unwrap();
        sync.sync_pending().await.unwrap();
        let doc = stores.table_defs.get(&def.id.to_string()).unwrap();
        assert!(doc.document.contains("Customer orders"));
        assert!(!doc.document.contains("orders table"));

        // 没有任何注释时退回原始名称
        DefRepository::upsert_table(&db, project.id, "t_raw", None, 1).await.unwrap();
        sync.sync_pending().await.unwrap();
        let raw = DefRepository::find_table(db, project.id, "t_raw").await.unwrap().unwrap();
        let doc = stores.table_defs.get(&raw.id.to_string()).unwrap();
        assert!(doc.document.contains("Description: t_raw"));
    }

    #[tokio::test]
    async fn purge_removes_stale_version_and_keeps_current() {
        let db = test_db().await;
        let project = seed_project(&db).await;

        // 版本 1 导入两列，版本 2 只保留其中一列
        DefRepository::upsert_column(&db, project.id, "orders", "legacy_col", "int", None, 1)
            .await
            .unwrap();
        DefRepository::upsert_column(&db, project.id, "orders", "amount", "bigint", None, 1)
            .await
            .unwrap();

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();
        sync.sync_pending().await.unwrap();
        assert_eq!(stores.column_defs.len(), 2);

        DefRepository::upsert_column(db, project.id, "orders", "amount", "bigint", None, 2)
            .await
            .unwrap();
        ProjectRepository::set_cur_version(db, project.id, 2).await.unwrap();

        sync.purge_stale().await.unwrap();

        // legacy_col（def_version=1）索引和存储都被删，amount（def_version=2）原样保留
        let columns = DefRepository::all_columns(db, project.id).await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].column_name, "amount");
        assert_eq!(stores.column_defs.len(), 1);
        let remaining = stores.column_defs.get(&columns[0].id.to_string()).unwrap();
        assert_eq!(remaining.metadata.get("column"), Some(&json!("amount")));
    }

    #[tokio::test]
    async fn purge_is_idempotent_after_partial_crash() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        DefRepository::upsert_table(&db, project.id, "legacy", None, 1).await.unwrap();

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();
        sync.sync_pending().await.unwrap();

        DefRepository::upsert_table(db, project.id, "fresh", None, 2).await.unwrap();
        ProjectRepository::set_cur_version(db, project.id, 2).await.unwrap();

        // 模拟在索引删除之后、行删除之前崩溃：手工只删索引
        let legacy = DefRepository::find_table(db, project.id, "legacy").await.unwrap().unwrap();
        stores
            .table_defs
            .delete_where(&Filter::and(vec![
                Filter::eq("project_id", project.id),
                Filter::eq("table", "legacy"),
                Filter::eq("version", 1),
            ]))
            .await
            .unwrap();

        // 重试整轮清理：重删不存在的索引是空操作，行照常删掉
        sync.purge_stale().await.unwrap();
        assert!(DefRepository::find_table(db, project.id, "legacy").await.unwrap().is_none());
        assert!(stores.table_defs.get(&legacy.id.to_string()).is_none());
    }

    #[tokio::test]
    async fn task_with_cleared_refer_flag_is_removed_from_index() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        TaskRepository::update_sql(&db, task.id, "SELECT 1").await.unwrap();
        TaskRepository::set_feedback(&db, task.id, Some(true), Some(true))
            .await
            .unwrap();

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();
        sync.sync_pending().await.unwrap();
        assert!(stores.sql_logs.get(&task.id.to_string()).is_some());

        // 参考标记被取消：下一轮同步从索引移除
        TaskRepository::set_feedback(db, task.id, Some(true), Some(false))
            .await
            .unwrap();
        sync.sync_pending().await.unwrap();
        assert!(stores.sql_logs.get(&task.id.to_string()).is_none());
    }
}
