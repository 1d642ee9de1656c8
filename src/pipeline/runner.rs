use crate::pipeline::error::PipelineError;
use crate::pipeline::{stages, PipelineContext};
use crate::storage::entity::{job, JobStage};
use crate::storage::repository::{JobRepository, TaskRepository};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// 单线程 job 轮询器：一次只跑一个 job，正确性优先于吞吐。
/// 需要吞吐时水平扩展进程，而不是进程内并发
pub struct JobRunner {
    ctx: Arc<PipelineContext>,
}

impl JobRunner {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// 一次轮询：反复取出全部 init job 执行，直到没有为止（串联出的新 job 也在本轮消化）
    pub async fn tick(&self) -> Result<usize, PipelineError> {
        let db = self.ctx.db.as_ref();
        let mut processed = 0usize;
        loop {
            let ids = JobRepository::init_ids(db).await?;
            if ids.is_empty() {
                break;
            }
            info!("待执行 job 数量: {}", ids.len());
            for id in ids {
                self.run_job(id).await;
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// 单个 job 的完整生命周期。处理器的任何失败都收敛为 job=fail，绝不让轮询挂掉
    async fn run_job(&self, job_id: i32) {
        let db = self.ctx.db.as_ref();

        // 认领：init -> running。抢不到说明已被取消或并发拿走
        match JobRepository::claim(db, job_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!("job {} 状态不是 init，跳过", job_id);
                return;
            }
            Err(e) => {
                error!("认领 job {} 失败: {}", job_id, e);
                return;
            }
        }
        // 认领后重读，处理器要用认领后的版本号做 job_data 写入校验
        let job = match JobRepository::find(db, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!("job {} 认领后消失", job_id);
                return;
            }
            Err(e) => {
                error!("读取 job {} 失败: {}", job_id, e);
                return;
            }
        };

        let started = Instant::now();
        let result = stages::dispatch(&self.ctx, &job).await;
        let cost_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(()) => match JobRepository::succeed(db, job_id, cost_ms).await {
                Ok(true) => {
                    info!("✓ job {} ({:?}) 完成，耗时 {}ms", job_id, job.stage, cost_ms);
                    if let Err(e) = self.chain_next(&job).await {
                        error!("任务 {} 创建下一阶段 job 失败: {}", job.task_id, e);
                    }
                }
                Ok(false) => info!("job {} 状态不是 running，跳过", job_id),
                Err(e) => error!("更新 job {} 状态失败: {}", job_id, e),
            },
            Err(e) => {
                warn!("✗ job {} ({:?}) 执行失败: {}", job_id, job.stage, e);
                match JobRepository::fail(db, job_id, &e.to_string()).await {
                    Ok(true) => {}
                    Ok(false) => info!("job {} 状态不是 running，跳过", job_id),
                    Err(e) => error!("更新 job {} 状态失败: {}", job_id, e),
                }
            }
        }
    }

    /// 仅在成功后串联：按任务选项决定是否自动创建下一阶段的 job
    async fn chain_next(&self, job: &job::Model) -> Result<(), PipelineError> {
        let db = self.ctx.db.as_ref();
        let Some(task) = TaskRepository::find(db, job.task_id).await? else {
            return Ok(());
        };
        let opts = task.parse_options();
        let next = match job.stage {
            JobStage::MatchDoc if opts.auto_match_sql_log => Some(JobStage::MatchSqlLog),
            JobStage::MatchSqlLog if opts.auto_gen_related_columns => {
                Some(JobStage::GenRelatedColumns)
            }
            JobStage::GenRelatedColumns if opts.auto_match_ddl => Some(JobStage::MatchDdl),
            JobStage::MatchDdl if opts.auto_gen_sql => Some(JobStage::GenerateSql),
            _ => None,
        };
        if let Some(stage) = next {
            JobRepository::create(db, job.task_id, stage).await?;
            info!("任务 {} 自动创建下一阶段 job: {:?}", job.task_id, stage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::LlmError;
    use crate::storage::entity::{JobStatus, TaskOptions};
    use crate::storage::repository::DefRepository;
    use crate::test_support::{seed_project, seed_task, test_ctx, test_db, StubProvider};
    use crate::vector::VectorStore;
    use serde_json::json;

    fn doc_metadata(id: i32, project_id: i32) -> crate::vector::Metadata {
        let mut m = crate::vector::Metadata::new();
        m.insert("id".to_string(), json!(id));
        m.insert("project_id".to_string(), json!(project_id));
        m.insert("default_selected".to_string(), json!(false));
        m.insert("disabled".to_string(), json!(false));
        m
    }

    #[tokio::test]
    async fn success_chains_exactly_the_enabled_stage() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let options = TaskOptions {
            auto_match_sql_log: true,
            auto_gen_related_columns: false,
            ..Default::default()
        };
        let task = seed_task(&db, project.id, &options).await;

        let provider = Arc::new(StubProvider::new(vec![]));
        let (ctx, stores) = test_ctx(db, provider);
        let doc = DefRepository::insert_doc(ctx.db.as_ref(), project.id, "退款口径说明", false, false)
            .await
            .unwrap();
        stores
            .docs
            .upsert(&doc.id.to_string(), "退款口径说明", doc_metadata(doc.id, project.id))
            .await
            .unwrap();

        JobRepository::create(ctx.db.as_ref(), task.id, JobStage::MatchDoc)
            .await
            .unwrap();

        let runner = JobRunner::new(ctx.clone());
        runner.tick().await.unwrap();

        let jobs = JobRepository::by_task(ctx.db.as_ref(), task.id).await.unwrap();
        let stages: Vec<JobStage> = jobs.iter().map(|j| j.stage).collect();
        assert_eq!(stages, vec![JobStage::MatchDoc, JobStage::MatchSqlLog]);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Success));
        // autoGenRelatedColumns 为 false：链在 MatchSqlLog 停止
        assert!(!stages.contains(&JobStage::GenRelatedColumns));

        let docs = TaskRepository::docs_of(ctx.db.as_ref(), task.id).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_id, doc.id);
    }

    #[tokio::test]
    async fn gateway_failure_marks_job_fail_with_message() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        let provider = Arc::new(StubProvider::new(vec![Err(LlmError::Http(
            "connection refused".to_string(),
        ))]));
        let (ctx, _stores) = test_ctx(db, provider);

        JobRepository::create(ctx.db.as_ref(), task.id, JobStage::GenRelatedColumns)
            .await
            .unwrap();
        JobRunner::new(ctx.clone()).tick().await.unwrap();

        let jobs = JobRepository::by_task(ctx.db.as_ref(), task.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Fail);
        let message = jobs[0].error_message.as_deref().unwrap();
        assert!(message.contains("connection refused"));
        // 失败不串联
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn malformed_ai_response_marks_job_fail() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        let provider = Arc::new(StubProvider::new(vec![Ok("抱歉，无法理解".to_string())]));
        let (ctx, _stores) = test_ctx(db, provider.clone());

        JobRepository::create(ctx.db.as_ref(), task.id, JobStage::GenRelatedColumns)
            .await
            .unwrap();
        JobRunner::new(ctx.clone()).tick().await.unwrap();

        let jobs = JobRepository::by_task(ctx.db.as_ref(), task.id).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Fail);
        assert!(jobs[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("malformed ai response"));
        // prompt 已经留在 job 现场，且确实带上了问题本身
        assert!(jobs[0].job_data.as_deref().unwrap().contains("prompt"));
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("统计上月每个客户的订单数"));
    }

    #[tokio::test]
    async fn canceled_init_job_is_skipped() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        let provider = Arc::new(StubProvider::new(vec![]));
        let (ctx, _stores) = test_ctx(db, provider);

        let job = JobRepository::create(ctx.db.as_ref(), task.id, JobStage::MatchDoc)
            .await
            .unwrap();
        JobRepository::cancel(ctx.db.as_ref(), job.id).await.unwrap();

        JobRunner::new(ctx.clone()).tick().await.unwrap();

        let job = JobRepository::find(ctx.db.as_ref(), job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn canceled_running_job_abandons_writes_silently() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        let provider = Arc::new(StubProvider::new(vec![]));
        let (ctx, stores) = test_ctx(db, provider);
        let doc = DefRepository::insert_doc(ctx.db.as_ref(), project.id, "文档", false, false)
            .await
            .unwrap();
        stores
            .docs
            .upsert(&doc.id.to_string(), "文档", doc_metadata(doc.id, project.id))
            .await
            .unwrap();

        let job = JobRepository::create(ctx.db.as_ref(), task.id, JobStage::MatchDoc)
            .await
            .unwrap();
        // 模拟执行中途被取消：先认领再取消，然后直接调处理器
        assert!(JobRepository::claim(ctx.db.as_ref(), job.id).await.unwrap());
        assert!(JobRepository::cancel(ctx.db.as_ref(), job.id).await.unwrap());
        let job = JobRepository::find(ctx.db.as_ref(), job.id).await.unwrap().unwrap();

        let result = stages::dispatch(&ctx, &job).await;
        assert!(result.is_ok());
        // 静默放弃：没有写入任何选中文档
        assert!(TaskRepository::docs_of(ctx.db.as_ref(), task.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn full_auto_pipeline_produces_sql() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let options = TaskOptions {
            auto_match_sql_log: true,
            auto_gen_related_columns: true,
            auto_match_ddl: true,
            auto_gen_sql: true,
            ..Default::default()
        };
        let task = seed_task(&db, project.id, &options).await;

        let related = json!({
            "tables": [{"t": "orders", "d": "订单"}],
            "columns": [{"t": "orders", "c": "amount", "d": "订单金额"}]
        });
        let provider = Arc::new(StubProvider::new(vec![
            Ok(related.to_string()),
            Ok(json!({"sql": "SELECT sum(amount) FROM orders"}).to_string()),
        ]));
        let (ctx, stores) = test_ctx(db, provider);
        let db = ctx.db.as_ref();

        DefRepository::upsert_table(db, project.id, "orders", Some("订单表"), 1)
            .await
            .unwrap();
        DefRepository::upsert_column(db, project.id, "orders", "amount", "bigint", Some("金额"), 1)
            .await
            .unwrap();

        let mut table_meta = crate::vector::Metadata::new();
        table_meta.insert("project_id".to_string(), json!(project.id));
        table_meta.insert("table".to_string(), json!("orders"));
        table_meta.insert("version".to_string(), json!(1));
        table_meta.insert("disabled".to_string(), json!(false));
        stores
            .table_defs
            .upsert("1", "Table: orders\nDescription: 订单表", table_meta)
            .await
            .unwrap();

        let mut column_meta = crate::vector::Metadata::new();
        column_meta.insert("project_id".to_string(), json!(project.id));
        column_meta.insert("table".to_string(), json!("orders"));
        column_meta.insert("column".to_string(), json!("amount"));
        column_meta.insert("version".to_string(), json!(1));
        stores
            .column_defs
            .upsert("2", "Table: orders\nColumn: amount\nDescription: 金额", column_meta)
            .await
            .unwrap();

        JobRepository::create(db, task.id, JobStage::MatchDoc).await.unwrap();
        JobRunner::new(ctx.clone()).tick().await.unwrap();

        let jobs = JobRepository::by_task(db, task.id).await.unwrap();
        let stages: Vec<JobStage> = jobs.iter().map(|j| j.stage).collect();
        assert_eq!(
            stages,
            vec![
                JobStage::MatchDoc,
                JobStage::MatchSqlLog,
                JobStage::GenRelatedColumns,
                JobStage::MatchDdl,
                JobStage::GenerateSql,
            ]
        );
        assert!(jobs.iter().all(|j| j.status == JobStatus::Success));

        let task = TaskRepository::find(db, task.id).await.unwrap().unwrap();
        assert_eq!(task.sql.as_deref(), Some("SELECT sum(amount) FROM orders"));
        assert!(task.related_columns.is_some());

        let tables = TaskRepository::tables_of(db, task.id).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_name, "orders");
        let columns = TaskRepository::columns_of(db, task.id).await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].column_name, "amount");
    }
}
