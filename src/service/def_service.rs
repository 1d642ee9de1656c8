//! 模式知识库（表/列/文档/规则/关系定义）的同步路径操作

use crate::ai::{ChatRequest, LlmProvider};
use crate::pipeline::parser::{self, AiTableComments};
use crate::pipeline::{prompt, PipelineError, Stores};
use crate::storage::repository::{DefRepository, ProjectRepository, TaskRepository};
use crate::vector::Filter;
use log::info;
use sea_orm::DatabaseConnection;

/// DDL 导入的表定义输入
#[derive(Clone, Debug)]
pub struct TableDefInput {
    pub table: String,
    pub comment: Option<String>,
}

/// DDL 导入的列定义输入
#[derive(Clone, Debug)]
pub struct ColumnDefInput {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub comment: Option<String>,
}

/// 重建索引请求：按类挑选
#[derive(Clone, Copy, Debug, Default)]
pub struct RefreshIndexRequest {
    pub refresh_table: bool,
    pub refresh_column: bool,
    pub refresh_doc: bool,
    pub refresh_sql: bool,
}

pub struct DefService;

impl DefService {
    /// 导入 DDL：全部定义按新版本 upsert，最后才推进项目版本。
    /// 没出现在本次导入里的旧定义随之过期，由后台清理扫描移除
    pub async fn update_ddl(
        db: &DatabaseConnection,
        project_id: i32,
        tables: &[TableDefInput],
        columns: &[ColumnDefInput],
    ) -> Result<i32, PipelineError> {
        let project = ProjectRepository::find(db, project_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("project {}", project_id)))?;
        let new_version = project.cur_version + 1;

        for table in tables {
            if table.table.trim().is_empty() {
                continue;
            }
            DefRepository::upsert_table(
                db,
                project_id,
                &table.table,
                table.comment.as_deref(),
                new_version,
            )
            .await?;
        }
        for column in columns {
            if column.table.trim().is_empty()
                || column.column.trim().is_empty()
                || column.data_type.trim().is_empty()
            {
                continue;
            }
            DefRepository::upsert_column(
                db,
                project_id,
                &column.table,
                &column.column,
                &column.data_type,
                column.comment.as_deref(),
                new_version,
            )
            .await?;
        }

        ProjectRepository::set_cur_version(db, project_id, new_version).await?;
        info!(
            "项目 {} DDL 已导入: {} 表 / {} 列，索引版本 -> {}",
            project_id,
            tables.len(),
            columns.len(),
            new_version
        );
        Ok(new_version)
    }

    /// 重建索引：清掉项目在对应集合里的全部文档，把当前版本的记录重新排队
    pub async fn refresh_index(
        db: &DatabaseConnection,
        stores: &Stores,
        project_id: i32,
        request: RefreshIndexRequest,
    ) -> Result<(), PipelineError> {
        let project = ProjectRepository::find(db, project_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("project {}", project_id)))?;
        let project_filter = Filter::eq("project_id", project_id);

        if request.refresh_table {
            stores.table_defs.delete_where(&project_filter).await?;
            let n = DefRepository::mark_tables_waiting(db, project_id, project.cur_version).await?;
            info!("项目 {} 重建表索引，重新排队 {} 条", project_id, n);
        }
        if request.refresh_column {
            stores.column_defs.delete_where(&project_filter).await?;
            let n = DefRepository::mark_columns_waiting(db, project_id, project.cur_version).await?;
            info!("项目 {} 重建列索引，重新排队 {} 条", project_id, n);
        }
        if request.refresh_doc {
            stores.docs.delete_where(&project_filter).await?;
            let n = DefRepository::mark_docs_waiting(db, project_id).await?;
            info!("项目 {} 重建文档索引，重新排队 {} 条", project_id, n);
        }
        if request.refresh_sql {
            stores.sql_logs.delete_where(&project_filter).await?;
            let n = TaskRepository::mark_refer_tasks_waiting(db, project_id).await?;
            info!("项目 {} 重建 SQL 索引，重新排队 {} 条", project_id, n);
        }
        Ok(())
    }

    pub async fn add_doc(
        db: &DatabaseConnection,
        project_id: i32,
        content: &str,
        default_selected: bool,
        disabled: bool,
    ) -> Result<i32, PipelineError> {
        let doc = DefRepository::insert_doc(db, project_id, content, default_selected, disabled)
            .await?;
        Ok(doc.id)
    }

    pub async fn update_doc(
        db: &DatabaseConnection,
        id: i32,
        content: &str,
        default_selected: bool,
        disabled: bool,
    ) -> Result<(), PipelineError> {
        if DefRepository::find_doc(db, id).await?.is_none() {
            return Err(PipelineError::NotFound(format!("doc {}", id)));
        }
        DefRepository::update_doc(db, id, content, default_selected, disabled).await?;
        Ok(())
    }

    /// 删除文档定义并立即从索引移除（文档没有版本序列，直接按 id 过滤）
    pub async fn delete_doc(
        db: &DatabaseConnection,
        stores: &Stores,
        id: i32,
    ) -> Result<(), PipelineError> {
        if DefRepository::delete_doc(db, id).await?.is_some() {
            stores.docs.delete_where(&Filter::eq("id", id)).await?;
        }
        Ok(())
    }

    /// 停用/启用一张表。重新排队让索引里的 disabled 标记跟上
    pub async fn disable_table(
        db: &DatabaseConnection,
        project_id: i32,
        table: &str,
        disabled: bool,
    ) -> Result<(), PipelineError> {
        DefRepository::set_table_disabled(db, project_id, table, disabled).await?;
        Ok(())
    }

    /// 人工确认一张表的 AI 注释：回写表和列，并整体重建这张表的关系
    pub async fn update_ai_comment(
        db: &DatabaseConnection,
        project_id: i32,
        table: &str,
        comment: &str,
        columns: &[(String, String)],
        relations: &[parser::LearnRelation],
    ) -> Result<(), PipelineError> {
        DefRepository::update_table_ai_comment(db, project_id, table, comment).await?;
        for (column, column_comment) in columns {
            DefRepository::update_column_ai_comment(db, project_id, table, column, column_comment)
                .await?;
        }

        DefRepository::delete_relations_of_table(db, project_id, table).await?;
        for r in relations {
            DefRepository::upsert_relation(
                db,
                project_id,
                &r.table1,
                &r.column1,
                &r.table2,
                &r.column2,
                &r.relation_type,
            )
            .await?;
        }
        Ok(())
    }

    /// 让 AI 为一张表的全部列起草注释，结果由人工确认后再落库
    pub async fn gen_table_ai_comments(
        db: &DatabaseConnection,
        provider: &dyn LlmProvider,
        model: &str,
        project_id: i32,
        table: &str,
    ) -> Result<AiTableComments, PipelineError> {
        let table_def = DefRepository::find_table(db, project_id, table)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("table {}", table)))?;
        let columns = DefRepository::columns_of_table(db, project_id, table).await?;

        let mut lines = Vec::new();
        lines.push(format!("## {}\n", table_def.table_name));
        if let Some(comment) = &table_def.comment {
            lines.push(format!("{}\n", comment));
        }
        lines.push("| Column | Type | Comment |".to_string());
        lines.push("|--------|------|---------|".to_string());
        for c in &columns {
            lines.push(format!(
                "| {} | {} | {} |",
                c.column_name,
                c.data_type,
                c.comment.as_deref().unwrap_or_default()
            ));
        }

        let req = ChatRequest {
            model: model.to_string(),
            system: prompt::SYSTEM.to_string(),
            user: prompt::gen_ai_comments(&lines.join("\n")),
            temperature: 0.5,
            max_tokens: 4096,
            expect_json: true,
        };
        let resp = provider.chat(req).await?;
        parser::parse_ai_comments(&resp.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_project, test_db, test_sync};

    #[tokio::test]
    async fn update_ddl_bumps_version_after_import() {
        let db = test_db().await;
        let project = seed_project(&db).await;

        let new_version = DefService::update_ddl(
            &db,
            project.id,
            &[TableDefInput {
                table: "orders".to_string(),
                comment: Some("订单表".to_string()),
            }],
            &[ColumnDefInput {
                table: "orders".to_string(),
                column: "amount".to_string(),
                data_type: "bigint".to_string(),
                comment: None,
            }],
        )
        .await
        .unwrap();
        assert_eq!(new_version, 2);

        let project = ProjectRepository::find(&db, project.id).await.unwrap().unwrap();
        assert_eq!(project.cur_version, 2);
        let table = DefRepository::find_table(&db, project.id, "orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.def_version, 2);
        assert!(table.waiting);
    }

    #[tokio::test]
    async fn reimport_without_a_table_makes_it_stale() {
        let db = test_db().await;
        let project = seed_project(&db).await;

        DefService::update_ddl(
            &db,
            project.id,
            &[
                TableDefInput { table: "orders".to_string(), comment: None },
                TableDefInput { table: "legacy".to_string(), comment: None },
            ],
            &[],
        )
        .await
        .unwrap();
        DefService::update_ddl(
            &db,
            project.id,
            &[TableDefInput { table: "orders".to_string(), comment: None }],
            &[],
        )
        .await
        .unwrap();

        let project = ProjectRepository::find(&db, project.id).await.unwrap().unwrap();
        let stale = DefRepository::stale_tables(&db, project.id, project.cur_version, 50)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].table_name, "legacy");
    }

    #[tokio::test]
    async fn refresh_index_purges_collection_and_requeues() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        DefRepository::upsert_table(&db, project.id, "orders", None, 1).await.unwrap();

        let (sync, stores, db) = test_sync(db);
        let db = db.as_ref();
        sync.sync_pending().await.unwrap();
        assert_eq!(stores.table_defs.len(), 1);
        assert!(DefRepository::waiting_tables(db, 10).await.unwrap().is_empty());

        let pipeline_stores = crate::pipeline::Stores {
            table_defs: stores.table_defs.clone(),
            column_defs: stores.column_defs.clone(),
            docs: stores.docs.clone(),
            sql_logs: stores.sql_logs.clone(),
        };
        DefService::refresh_index(
            db,
            &pipeline_stores,
            project.id,
            RefreshIndexRequest {
                refresh_table: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(stores.table_defs.len(), 0);
        assert_eq!(DefRepository::waiting_tables(db, 10).await.unwrap().len(), 1);
    }
}
