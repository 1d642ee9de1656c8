//! 六个阶段的处理器。统一套路：读任务并记下版本，调外部能力，
//! 写库前确认 job 未被取消，最后带版本校验一次性落盘

use crate::ai::ChatRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::{context, parser, prompt, PipelineContext};
use crate::storage::entity::{job, JobStage, JobStatus};
use crate::storage::repository::{DefRepository, JobRepository, ProjectRepository, TaskRepository};
use crate::vector::Filter;
use futures::future::try_join_all;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub async fn dispatch(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    match job.stage {
        JobStage::MatchDoc => match_doc(ctx, job).await,
        JobStage::MatchSqlLog => match_sql_log(ctx, job).await,
        JobStage::GenRelatedColumns => gen_related_columns(ctx, job).await,
        JobStage::MatchDdl => match_ddl(ctx, job).await,
        JobStage::GenerateSql => generate_sql(ctx, job).await,
        JobStage::LearnFromSql => learn_from_sql(ctx, job).await,
    }
}

/// 落盘前的 job 状态检查：已取消则静默放弃（false），其它非 running 状态视为异常
async fn job_still_running(db: &DatabaseConnection, job_id: i32) -> Result<bool, PipelineError> {
    let job = JobRepository::find(db, job_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("job {}", job_id)))?;
    match job.status {
        JobStatus::Canceled => Ok(false),
        JobStatus::Running => Ok(true),
        other => Err(PipelineError::InvalidState(format!(
            "job {} status is {:?}, not running",
            job_id, other
        ))),
    }
}

async fn load_task(
    db: &DatabaseConnection,
    task_id: i32,
) -> Result<crate::storage::entity::task::Model, PipelineError> {
    TaskRepository::find(db, task_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("task {}", task_id)))
}

/// 把发出的 prompt 留在 job 现场，再调 AI
async fn record_prompt_and_chat(
    ctx: &PipelineContext,
    job: &job::Model,
    prompt: String,
) -> Result<String, PipelineError> {
    let data = serde_json::json!({ "prompt": prompt });
    if !JobRepository::set_data_guarded(ctx.db.as_ref(), job.id, job.version, &data).await? {
        return Err(PipelineError::Conflict);
    }
    let req = ChatRequest {
        model: ctx.model.clone(),
        system: prompt::SYSTEM.to_string(),
        user: prompt,
        temperature: ctx.temperature,
        max_tokens: 4096,
        expect_json: true,
    };
    let resp = ctx.provider.chat(req).await?;
    Ok(resp.text)
}

/// 语义检索相关文档，默认选中的文档排最前
async fn match_doc(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let opts = task.parse_options();
    let read_version = task.version;

    let filter = Filter::and(vec![
        Filter::eq("project_id", task.project_id),
        Filter::eq("default_selected", false),
        Filter::eq("disabled", false),
    ]);
    let results = ctx
        .stores
        .docs
        .query(&task.question, opts.match_doc_count, Some(&filter))
        .await?;

    let mut doc_ids = Vec::new();
    let mut seen = BTreeSet::new();
    for doc in DefRepository::default_selected_docs(db, task.project_id).await? {
        if seen.insert(doc.id) {
            doc_ids.push(doc.id);
        }
    }
    for metadata in &results {
        if let Some(id) = metadata.get("id").and_then(Value::as_i64) {
            let id = id as i32;
            if seen.insert(id) {
                doc_ids.push(id);
            }
        }
    }

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    if !TaskRepository::insert_docs_guarded(db, &task, read_version, &doc_ids).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}

/// 语义检索相似的历史 SQL
async fn match_sql_log(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let opts = task.parse_options();
    let read_version = task.version;

    let filter = Filter::eq("project_id", task.project_id);
    let results = ctx
        .stores
        .sql_logs
        .query(&task.question, opts.match_sql_log_count, Some(&filter))
        .await?;

    let mut sql_ids = Vec::new();
    let mut seen = BTreeSet::new();
    for metadata in &results {
        if let Some(id) = metadata.get("task_id").and_then(Value::as_i64) {
            let id = id as i32;
            if seen.insert(id) {
                sql_ids.push(id);
            }
        }
    }

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    if !TaskRepository::insert_sqls_guarded(db, &task, read_version, &sql_ids).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}

/// AI 推断问题涉及的表和字段，供 MatchDdl 做检索词
async fn gen_related_columns(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let read_version = task.version;

    let doc_content = context::doc_content(db, task.id).await?;
    let sql_content = context::sql_log_markdown(db, task.id).await?;
    let prompt = prompt::gen_related_columns(
        &task.question,
        task.question_supplement.as_deref(),
        &doc_content,
        &sql_content,
    );

    let text = record_prompt_and_chat(ctx, job, prompt).await?;

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    let related = parser::parse_related_columns(&text)?;
    let value = serde_json::to_string(&related)
        .map_err(|e| PipelineError::Parse(format!("serialize related columns: {}", e)))?;
    if !TaskRepository::set_related_columns_guarded(db, task.id, read_version, &value).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}

/// 拿相关表/字段去向量库两级检索：先锁定表，再在表内找列
async fn match_ddl(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let opts = task.parse_options();
    let read_version = task.version;
    let project_id = task.project_id;

    let related: parser::RelatedColumns = task
        .related_columns
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| PipelineError::Parse(format!("stored related columns: {}", e)))?
        .ok_or_else(|| {
            PipelineError::InvalidState("related_columns is empty, run gen_related_columns first".to_string())
        })?;

    let table_top_n = opts.match_ddl_table_count;
    let table_futures = related.tables.iter().map(|t| {
        let store = &ctx.stores.table_defs;
        let query = format!("Table: {}\nDescription: {}", t.t, t.d);
        let filter = Filter::and(vec![
            Filter::eq("project_id", project_id),
            Filter::eq("disabled", false),
        ]);
        async move { store.query(&query, table_top_n, Some(&filter)).await }
    });
    let table_results = try_join_all(table_futures).await?;

    let mut matched_tables = BTreeSet::new();
    for result in table_results {
        for metadata in result {
            if let Some(table) = metadata.get("table").and_then(Value::as_str) {
                matched_tables.insert(table.to_string());
            }
        }
    }

    let table_values: Vec<Value> = matched_tables
        .iter()
        .map(|t| Value::String(t.clone()))
        .collect();
    let column_top_n = opts.match_ddl_column_count;
    let column_futures = related.columns.iter().map(|c| {
        let store = &ctx.stores.column_defs;
        let query = format!("Table: {}\nColumn: {}\nDescription: {}", c.t, c.c, c.d);
        let filter = Filter::and(vec![
            Filter::eq("project_id", project_id),
            Filter::is_in("table", table_values.clone()),
        ]);
        async move { store.query(&query, column_top_n, Some(&filter)).await }
    });
    let column_results = try_join_all(column_futures).await?;

    let mut selected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for result in column_results {
        for metadata in result {
            let table = metadata.get("table").and_then(Value::as_str);
            let column = metadata.get("column").and_then(Value::as_str);
            if let (Some(table), Some(column)) = (table, column) {
                selected
                    .entry(table.to_string())
                    .or_default()
                    .insert(column.to_string());
            }
        }
    }

    let tables: Vec<String> = selected.keys().cloned().collect();
    let columns: Vec<(String, String)> = selected
        .iter()
        .flat_map(|(t, cols)| cols.iter().map(move |c| (t.clone(), c.clone())))
        .collect();

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    if !TaskRepository::insert_selection_guarded(db, &task, read_version, &tables, &columns).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}

/// 汇总全部上下文让 AI 生成 SQL
async fn generate_sql(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let read_version = task.version;
    let project = ProjectRepository::find(db, task.project_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("project {}", task.project_id)))?;

    let table_structure = context::table_structure_markdown(db, task.project_id, task.id).await?;
    let relation_structure =
        context::relation_structure_markdown(db, task.project_id, task.id).await?;
    let doc_content = context::doc_content(db, task.id).await?;
    let sql_content = context::sql_log_markdown(db, task.id).await?;
    let rules = context::rule_markdown(db, &task).await?;

    let prompt = prompt::gen_sql(
        &task.question,
        task.question_supplement.as_deref(),
        &doc_content,
        &sql_content,
        &table_structure,
        &relation_structure,
        &rules,
        &project.db_type,
        project.db_version.as_deref(),
    );

    let text = record_prompt_and_chat(ctx, job, prompt).await?;

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    let sql = parser::parse_sql_answer(&text)?;
    if !TaskRepository::set_sql_guarded(db, task.id, read_version, &sql).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}

/// 从确认正确的 SQL 中提炼学习结论，已有结论则不覆盖
async fn learn_from_sql(ctx: &PipelineContext, job: &job::Model) -> Result<(), PipelineError> {
    let db = ctx.db.as_ref();
    let task = load_task(db, job.task_id).await?;
    let read_version = task.version;
    let Some(sql) = task.sql.as_deref() else {
        return Err(PipelineError::InvalidState("task sql is empty".to_string()));
    };

    let table_structure = context::table_structure_markdown(db, task.project_id, task.id).await?;
    let sql_structure = context::sql_log_markdown(db, task.id).await?;
    let prompt = prompt::learn(
        &task.question,
        task.question_supplement.as_deref(),
        sql,
        &table_structure,
        &sql_structure,
    );

    let text = record_prompt_and_chat(ctx, job, prompt).await?;

    if !job_still_running(db, job.id).await? {
        return Ok(());
    }
    let learn = parser::parse_learn_result(&text)?;

    let current = load_task(db, task.id).await?;
    if current.learn_result.is_some() {
        return Ok(());
    }
    let value = serde_json::to_string(&learn)
        .map_err(|e| PipelineError::Parse(format!("serialize learn result: {}", e)))?;
    if !TaskRepository::set_learn_result_guarded(db, task.id, read_version, &value).await? {
        return Err(PipelineError::Conflict);
    }
    Ok(())
}
