//! 同步请求路径上的任务操作。这些写入和后台轮询共享 Task/Job 行，
//! 全部走短事务，版本递增由仓储层保证

use crate::ai::{ChatRequest, LlmProvider};
use crate::pipeline::parser::{self, LearnResult};
use crate::pipeline::{prompt, PipelineError, Stores};
use crate::storage::entity::{task, JobStage, TaskOptions};
use crate::storage::repository::{DefRepository, JobRepository, TaskRepository};
use crate::vector::{Filter, Metadata};
use log::info;
use sea_orm::DatabaseConnection;

pub struct TaskService;

impl TaskService {
    /// 创建任务并立即排入 MatchDoc 阶段
    pub async fn create_task(
        db: &DatabaseConnection,
        project_id: i32,
        question: &str,
        question_supplement: Option<&str>,
        options: &TaskOptions,
        rules: Option<&[i32]>,
    ) -> Result<task::Model, PipelineError> {
        let task =
            TaskRepository::create(db, project_id, question, question_supplement, options, rules)
                .await?;
        JobRepository::create(db, task.id, JobStage::MatchDoc).await?;
        info!("任务 {} 已创建并排入流水线", task.id);
        Ok(task)
    }

    /// 重新从头跑流水线
    pub async fn re_create_task(db: &DatabaseConnection, task_id: i32) -> Result<(), PipelineError> {
        Self::require_task(db, task_id).await?;
        JobRepository::create(db, task_id, JobStage::MatchDoc).await?;
        Ok(())
    }

    pub async fn update_question(
        db: &DatabaseConnection,
        task_id: i32,
        question: &str,
        question_supplement: Option<&str>,
    ) -> Result<(), PipelineError> {
        Self::require_task(db, task_id).await?;
        TaskRepository::update_question(db, task_id, question, question_supplement).await?;
        Ok(())
    }

    pub async fn update_sql(
        db: &DatabaseConnection,
        task_id: i32,
        sql: &str,
    ) -> Result<(), PipelineError> {
        Self::require_task(db, task_id).await?;
        TaskRepository::update_sql(db, task_id, sql).await?;
        Ok(())
    }

    pub async fn update_selected_columns(
        db: &DatabaseConnection,
        task_id: i32,
        selections: &[(String, Vec<String>)],
    ) -> Result<(), PipelineError> {
        TaskRepository::update_selected_columns(db, task_id, selections).await?;
        Ok(())
    }

    pub async fn update_selected_docs(
        db: &DatabaseConnection,
        task_id: i32,
        doc_ids: &[i32],
    ) -> Result<(), PipelineError> {
        TaskRepository::update_selected_docs(db, task_id, doc_ids).await?;
        Ok(())
    }

    pub async fn update_selected_sql_logs(
        db: &DatabaseConnection,
        task_id: i32,
        sql_ids: &[i32],
    ) -> Result<(), PipelineError> {
        TaskRepository::update_selected_sqls(db, task_id, sql_ids).await?;
        Ok(())
    }

    /// 请求重新生成 SQL。上一个 job 还没跑完时拒绝，避免同一任务双跑
    pub async fn req_generate_sql(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<(), PipelineError> {
        Self::require_task(db, task_id).await?;
        if let Some(last) = JobRepository::latest_for_task(db, task_id).await? {
            if !last.status.is_terminal() {
                return Err(PipelineError::InvalidState(
                    "last job is still running".to_string(),
                ));
            }
        }
        TaskRepository::clear_feedback(db, task_id).await?;
        JobRepository::create(db, task_id, JobStage::GenerateSql).await?;
        Ok(())
    }

    /// 手动触发学习
    pub async fn learn(db: &DatabaseConnection, task_id: i32) -> Result<(), PipelineError> {
        let task = Self::require_task(db, task_id).await?;
        if task.sql.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(PipelineError::Validation("sql is empty".to_string()));
        }
        JobRepository::create(db, task_id, JobStage::LearnFromSql).await?;
        Ok(())
    }

    /// 记录 SQL 反馈。确认正确且开了 autoLearnOnRight 时自动排一个学习 job，
    /// 但任务上还有 job 在跑或已有学习结论时不排
    pub async fn update_sql_feedback(
        db: &DatabaseConnection,
        task_id: i32,
        sql_right: bool,
        sql_refer: bool,
    ) -> Result<(), PipelineError> {
        let task = Self::require_task(db, task_id).await?;
        TaskRepository::set_feedback(db, task_id, Some(sql_right), Some(sql_refer)).await?;

        let opts = task.parse_options();
        if sql_right && task.learn_result.is_none() && opts.auto_learn_on_right {
            let latest = JobRepository::latest_for_task(db, task_id).await?;
            if latest.map(|j| j.status.is_terminal()).unwrap_or(true) {
                JobRepository::create(db, task_id, JobStage::LearnFromSql).await?;
                info!("任务 {} 自动排入学习阶段", task_id);
            }
        }
        Ok(())
    }

    pub async fn cancel_job(db: &DatabaseConnection, job_id: i32) -> Result<bool, PipelineError> {
        Ok(JobRepository::cancel(db, job_id).await?)
    }

    /// 采纳学习结论：回写表/列的 AI 注释并补充表关系
    pub async fn accept_learn_result(
        db: &DatabaseConnection,
        task_id: i32,
        learn: &LearnResult,
    ) -> Result<(), PipelineError> {
        let task = Self::require_task(db, task_id).await?;
        for t in &learn.tables {
            if DefRepository::find_table(db, task.project_id, &t.table)
                .await?
                .is_some()
            {
                DefRepository::update_table_ai_comment(db, task.project_id, &t.table, &t.desc)
                    .await?;
            }
        }
        for c in &learn.columns {
            DefRepository::update_column_ai_comment(
                db,
                task.project_id,
                &c.table,
                &c.column,
                &c.desc,
            )
            .await?;
        }
        for r in &learn.relations {
            DefRepository::upsert_relation(
                db,
                task.project_id,
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

    /// 删除任务：级联删除子记录和 job 历史，并从 SQL 索引移除
    pub async fn delete_task(
        db: &DatabaseConnection,
        stores: &Stores,
        task_id: i32,
    ) -> Result<(), PipelineError> {
        if TaskRepository::find(db, task_id).await?.is_none() {
            return Ok(());
        }
        TaskRepository::delete_cascade(db, task_id).await?;
        stores
            .sql_logs
            .delete_where(&Filter::eq("task_id", task_id))
            .await?;
        Ok(())
    }

    /// 让 AI 把问题改写得更明确
    pub async fn optimize_question(
        provider: &dyn LlmProvider,
        model: &str,
        question: &str,
    ) -> Result<String, PipelineError> {
        let req = ChatRequest {
            model: model.to_string(),
            system: prompt::SYSTEM.to_string(),
            user: prompt::optimize_question(question),
            temperature: 0.5,
            max_tokens: 1024,
            expect_json: true,
        };
        let resp = provider.chat(req).await?;
        parser::parse_optimized_question(&resp.text)
    }

    /// 语义搜索历史 SQL
    pub async fn search_sql_log(
        stores: &Stores,
        project_id: i32,
        content: &str,
    ) -> Result<Vec<Metadata>, PipelineError> {
        Ok(stores
            .sql_logs
            .query(content, 10, Some(&Filter::eq("project_id", project_id)))
            .await?)
    }

    async fn require_task(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<task::Model, PipelineError> {
        TaskRepository::find(db, task_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("task {}", task_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::JobStatus;
    use crate::test_support::{seed_project, test_db};

    #[tokio::test]
    async fn create_task_queues_match_doc_job() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = TaskService::create_task(
            &db,
            project.id,
            "上月销售额",
            None,
            &TaskOptions::default(),
            None,
        )
        .await
        .unwrap();

        let jobs = JobRepository::by_task(&db, task.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].stage, JobStage::MatchDoc);
        assert_eq!(jobs[0].status, JobStatus::Init);
    }

    #[tokio::test]
    async fn req_generate_sql_rejected_while_job_pending() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = TaskService::create_task(
            &db,
            project.id,
            "上月销售额",
            None,
            &TaskOptions::default(),
            None,
        )
        .await
        .unwrap();

        // create_task 排的 MatchDoc 还是 init
        let err = TaskService::req_generate_sql(&db, task.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));

        // 取消后可以重新生成
        let jobs = JobRepository::by_task(&db, task.id).await.unwrap();
        JobRepository::cancel(&db, jobs[0].id).await.unwrap();
        TaskService::req_generate_sql(&db, task.id).await.unwrap();

        let jobs = JobRepository::by_task(&db, task.id).await.unwrap();
        assert_eq!(jobs.last().unwrap().stage, JobStage::GenerateSql);
    }

    #[tokio::test]
    async fn feedback_auto_queues_learn_job_once() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let options = TaskOptions {
            auto_learn_on_right: true,
            ..Default::default()
        };
        let task = TaskRepository::create(&db, project.id, "问题", None, &options, None)
            .await
            .unwrap();
        TaskRepository::update_sql(&db, task.id, "SELECT 1").await.unwrap();

        TaskService::update_sql_feedback(&db, task.id, true, true)
            .await
            .unwrap();

        let jobs = JobRepository::by_task(&db, task.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].stage, JobStage::LearnFromSql);

        // 上一个学习 job 还没结束：不重复排
        TaskService::update_sql_feedback(&db, task.id, true, true)
            .await
            .unwrap();
        let jobs = JobRepository::by_task(&db, task.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn learn_requires_sql() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = TaskRepository::create(&db, project.id, "问题", None, &TaskOptions::default(), None)
            .await
            .unwrap();

        let err = TaskService::learn(&db, task.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
