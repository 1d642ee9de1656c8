//! 拼装 prompt 所需的上下文片段：文档内容、历史 SQL、表结构和关系的 markdown

use crate::storage::entity::task;
use crate::storage::repository::{DefRepository, TaskRepository};
use sea_orm::{DatabaseConnection, DbErr};
use std::collections::BTreeMap;

pub fn fix_question(question: &str) -> String {
    question.replace('\n', " ")
}

/// 任务关联文档的内容，--- 分隔
pub async fn doc_content(db: &DatabaseConnection, task_id: i32) -> Result<String, DbErr> {
    let task_docs = TaskRepository::docs_of(db, task_id).await?;
    let ids: Vec<i32> = task_docs.iter().map(|d| d.doc_id).collect();
    let docs = DefRepository::docs_by_ids(db, &ids).await?;
    let by_id: BTreeMap<i32, String> = docs.into_iter().map(|d| (d.id, d.content)).collect();
    let contents: Vec<String> = ids.iter().filter_map(|id| by_id.get(id).cloned()).collect();
    Ok(contents.join("\n\n---\n\n"))
}

/// 任务引用的历史 SQL（问题 + SQL 代码块），--- 分隔
pub async fn sql_log_markdown(db: &DatabaseConnection, task_id: i32) -> Result<String, DbErr> {
    let task_sqls = TaskRepository::sqls_of(db, task_id).await?;
    let ids: Vec<i32> = task_sqls.iter().map(|s| s.sql_id).collect();
    let referenced = TaskRepository::find_by_ids(db, &ids).await?;
    let by_id: BTreeMap<i32, task::Model> =
        referenced.into_iter().map(|t| (t.id, t)).collect();

    let mut markdowns = Vec::new();
    for id in ids {
        let Some(t) = by_id.get(&id) else { continue };
        let Some(sql) = t.sql.as_deref() else { continue };
        markdowns.push(format!(
            "## {}\n\n```sql\n{}\n```",
            fix_question(&t.question),
            sql
        ));
    }
    Ok(markdowns.join("\n\n---\n\n"))
}

/// 按选中的列生成表结构 markdown，描述优先取 AI 注释
pub async fn table_structure_markdown(
    db: &DatabaseConnection,
    project_id: i32,
    task_id: i32,
) -> Result<String, DbErr> {
    let table_defs: BTreeMap<String, Option<String>> = DefRepository::all_tables(db, project_id)
        .await?
        .into_iter()
        .map(|t| (t.table_name, t.ai_comment.or(t.comment)))
        .collect();
    let column_defs: BTreeMap<(String, String), (String, Option<String>)> =
        DefRepository::all_columns(db, project_id)
            .await?
            .into_iter()
            .map(|c| {
                (
                    (c.table_name, c.column_name),
                    (c.data_type, c.ai_comment.or(c.comment)),
                )
            })
            .collect();

    // 按首次出现的顺序给选中的列分组
    let selected = TaskRepository::columns_of(db, task_id).await?;
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for col in selected {
        match grouped.iter_mut().find(|(t, _)| *t == col.table_name) {
            Some((_, cols)) => cols.push(col.column_name),
            None => grouped.push((col.table_name, vec![col.column_name])),
        }
    }

    let mut markdowns = Vec::new();
    for (table_name, columns) in grouped {
        let mut lines = Vec::new();
        lines.push(format!("## {}\n", table_name));
        if let Some(Some(comment)) = table_defs.get(&table_name) {
            lines.push(format!("{}\n", comment));
        }
        lines.push("| Column | Type | Description |".to_string());
        lines.push("|--------|------|-------------|".to_string());
        for column in columns {
            let key = (table_name.clone(), column.clone());
            let (data_type, comment) = column_defs
                .get(&key)
                .cloned()
                .unwrap_or((String::new(), None));
            lines.push(format!(
                "| {} | {} | {} |",
                column,
                data_type,
                comment.unwrap_or_default()
            ));
        }
        markdowns.push(lines.join("\n"));
    }
    Ok(markdowns.join("\n\n"))
}

/// 选中表之间的关系 markdown，没有关系时为空
pub async fn relation_structure_markdown(
    db: &DatabaseConnection,
    project_id: i32,
    task_id: i32,
) -> Result<String, DbErr> {
    let tables: Vec<String> = TaskRepository::tables_of(db, task_id)
        .await?
        .into_iter()
        .map(|t| t.table_name)
        .collect();
    let relations = DefRepository::relations_between(db, project_id, &tables).await?;
    if relations.is_empty() {
        return Ok(String::new());
    }

    let mut lines = Vec::new();
    lines.push("## Table Relationships\n".to_string());
    lines.push("| Table1 | Column1 | Table2 | Column2 | Relationship Type |".to_string());
    lines.push("|--------|---------|---------|---------|------------------|".to_string());
    for r in relations {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            r.table1, r.column1, r.table2, r.column2, r.relation_type
        ));
    }
    Ok(lines.join("\n"))
}

/// 任务挂载的规则内容，--- 分隔
pub async fn rule_markdown(db: &DatabaseConnection, task: &task::Model) -> Result<String, DbErr> {
    let ids = task.parse_rule_ids();
    let rules = DefRepository::rules_by_ids(db, &ids).await?;
    Ok(rules
        .into_iter()
        .map(|r| r.content)
        .collect::<Vec<_>>()
        .join("\n\n---\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::TaskOptions;
    use crate::storage::repository::DefRepository;
    use crate::test_support::{seed_project, seed_task, test_db};

    #[tokio::test]
    async fn table_structure_prefers_ai_comment() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        DefRepository::upsert_table(&db, project.id, "orders", Some("订单表"), 1)
            .await
            .unwrap();
        DefRepository::update_table_ai_comment(&db, project.id, "orders", "客户订单主表")
            .await
            .unwrap();
        DefRepository::upsert_column(&db, project.id, "orders", "amount", "bigint", Some("金额"), 1)
            .await
            .unwrap();
        TaskRepository::update_selected_columns(
            &db,
            task.id,
            &[("orders".to_string(), vec!["amount".to_string()])],
        )
        .await
        .unwrap();

        let markdown = table_structure_markdown(&db, project.id, task.id)
            .await
            .unwrap();
        assert!(markdown.contains("## orders"));
        assert!(markdown.contains("客户订单主表"));
        assert!(!markdown.contains("订单表\n"));
        assert!(markdown.contains("| amount | bigint | 金额 |"));
    }

    #[tokio::test]
    async fn sql_log_markdown_flattens_question_newlines() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let reference = TaskRepository::create(
            &db,
            project.id,
            "第一行\n第二行",
            None,
            &TaskOptions::default(),
            None,
        )
        .await
        .unwrap();
        TaskRepository::update_sql(&db, reference.id, "SELECT 1").await.unwrap();

        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        TaskRepository::update_selected_sqls(&db, task.id, &[reference.id])
            .await
            .unwrap();

        let markdown = sql_log_markdown(&db, task.id).await.unwrap();
        assert!(markdown.contains("## 第一行 第二行"));
        assert!(markdown.contains("```sql\nSELECT 1\n```"));
    }
}
