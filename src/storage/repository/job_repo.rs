use crate::storage::entity::job::{self, ActiveModel as JobActiveModel, Entity as Job};
use crate::storage::entity::{task, task_column, task_doc, task_sql, task_table, JobStage, JobStatus};
use crate::storage::repository::now_ts;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};

pub struct JobRepository;

impl JobRepository {
    /// 创建新 job。先清理该阶段之前派生的任务数据，保证重跑从干净状态开始
    pub async fn create(
        db: &DatabaseConnection,
        task_id: i32,
        stage: JobStage,
    ) -> Result<job::Model, DbErr> {
        let txn = db.begin().await?;

        let Some(task) = task::Entity::find_by_id(task_id).one(&txn).await? else {
            txn.rollback().await?;
            return Err(DbErr::RecordNotFound(format!("task {} not found", task_id)));
        };

        let now = now_ts();
        match stage {
            JobStage::MatchDoc => {
                task_doc::Entity::delete_many()
                    .filter(task_doc::Column::TaskId.eq(task_id))
                    .exec(&txn)
                    .await?;
                Self::bump_task(&txn, task_id, now).await?;
            }
            JobStage::MatchSqlLog => {
                task_sql::Entity::delete_many()
                    .filter(task_sql::Column::TaskId.eq(task_id))
                    .exec(&txn)
                    .await?;
                Self::bump_task(&txn, task_id, now).await?;
            }
            JobStage::GenRelatedColumns => {
                task::Entity::update_many()
                    .col_expr(
                        task::Column::RelatedColumns,
                        Expr::value(Option::<String>::None),
                    )
                    .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
                    .col_expr(task::Column::UpdatedAt, Expr::value(now))
                    .filter(task::Column::Id.eq(task_id))
                    .exec(&txn)
                    .await?;
            }
            JobStage::MatchDdl => {
                task_table::Entity::delete_many()
                    .filter(task_table::Column::TaskId.eq(task_id))
                    .exec(&txn)
                    .await?;
                task_column::Entity::delete_many()
                    .filter(task_column::Column::TaskId.eq(task_id))
                    .exec(&txn)
                    .await?;
                Self::bump_task(&txn, task_id, now).await?;
            }
            JobStage::GenerateSql => {
                task::Entity::update_many()
                    .col_expr(task::Column::Sql, Expr::value(Option::<String>::None))
                    .col_expr(task::Column::SqlRight, Expr::value(Option::<bool>::None))
                    .col_expr(task::Column::SqlRefer, Expr::value(Option::<bool>::None))
                    .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
                    .col_expr(task::Column::UpdatedAt, Expr::value(now))
                    .filter(task::Column::Id.eq(task_id))
                    .exec(&txn)
                    .await?;
            }
            JobStage::LearnFromSql => {
                task::Entity::update_many()
                    .col_expr(task::Column::LearnResult, Expr::value(Option::<String>::None))
                    .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
                    .col_expr(task::Column::UpdatedAt, Expr::value(now))
                    .filter(task::Column::Id.eq(task_id))
                    .exec(&txn)
                    .await?;
            }
        }

        let model = JobActiveModel {
            project_id: Set(task.project_id),
            task_id: Set(task_id),
            stage: Set(stage),
            status: Set(JobStatus::Init),
            cost_time_ms: Set(0),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let inserted = model.insert(&txn).await?;

        txn.commit().await?;
        Ok(inserted)
    }

    async fn bump_task<C: ConnectionTrait>(conn: &C, task_id: i32, now: i64) -> Result<(), DbErr> {
        task::Entity::update_many()
            .col_expr(task::Column::Version, Expr::col(task::Column::Version).add(1))
            .col_expr(task::Column::UpdatedAt, Expr::value(now))
            .filter(task::Column::Id.eq(task_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<job::Model>, DbErr> {
        Job::find_by_id(id).one(db).await
    }

    /// 所有 init 状态的 job id，按创建顺序
    pub async fn init_ids(db: &DatabaseConnection) -> Result<Vec<i32>, DbErr> {
        let jobs = Job::find()
            .filter(job::Column::Status.eq(JobStatus::Init))
            .order_by_asc(job::Column::Id)
            .all(db)
            .await?;
        Ok(jobs.into_iter().map(|j| j.id).collect())
    }

    /// init -> running。条件更新即原子认领，返回 false 表示已被别人改走
    pub async fn claim(db: &DatabaseConnection, id: i32) -> Result<bool, DbErr> {
        let res = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Running))
            .col_expr(job::Column::Version, Expr::col(job::Column::Version).add(1))
            .col_expr(job::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Init))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// running -> success，记录耗时。仅在仍为 running 时生效
    pub async fn succeed(db: &DatabaseConnection, id: i32, cost_ms: i64) -> Result<bool, DbErr> {
        let res = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Success))
            .col_expr(job::Column::CostTimeMs, Expr::value(cost_ms))
            .col_expr(job::Column::Version, Expr::col(job::Column::Version).add(1))
            .col_expr(job::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Running))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// running -> fail，原样记录错误文本。仅在仍为 running 时生效
    pub async fn fail(db: &DatabaseConnection, id: i32, message: &str) -> Result<bool, DbErr> {
        let res = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Fail))
            .col_expr(job::Column::ErrorMessage, Expr::value(message.to_string()))
            .col_expr(job::Column::Version, Expr::col(job::Column::Version).add(1))
            .col_expr(job::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Running))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// init/running -> canceled
    pub async fn cancel(db: &DatabaseConnection, id: i32) -> Result<bool, DbErr> {
        let res = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Canceled))
            .col_expr(job::Column::Version, Expr::col(job::Column::Version).add(1))
            .col_expr(job::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(job::Column::Id.eq(id))
            .filter(
                job::Column::Status
                    .eq(JobStatus::Init)
                    .or(job::Column::Status.eq(JobStatus::Running)),
            )
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 带版本校验写入 job_data，竞争失败返回 false
    pub async fn set_data_guarded(
        db: &DatabaseConnection,
        id: i32,
        read_version: i32,
        data: &serde_json::Value,
    ) -> Result<bool, DbErr> {
        let res = Job::update_many()
            .col_expr(job::Column::JobData, Expr::value(data.to_string()))
            .col_expr(job::Column::Version, Expr::col(job::Column::Version).add(1))
            .col_expr(job::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Version.eq(read_version))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn by_task(db: &DatabaseConnection, task_id: i32) -> Result<Vec<job::Model>, DbErr> {
        Job::find()
            .filter(job::Column::TaskId.eq(task_id))
            .order_by_asc(job::Column::Id)
            .all(db)
            .await
    }

    pub async fn latest_for_task(
        db: &DatabaseConnection,
        task_id: i32,
    ) -> Result<Option<job::Model>, DbErr> {
        Job::find()
            .filter(job::Column::TaskId.eq(task_id))
            .order_by_desc(job::Column::Id)
            .one(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::TaskOptions;
    use crate::storage::repository::TaskRepository;
    use crate::test_support::{seed_project, seed_task, test_db};

    #[tokio::test]
    async fn create_generate_sql_job_clears_prior_sql_and_feedback() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;

        TaskRepository::update_sql(&db, task.id, "SELECT 1").await.unwrap();
        TaskRepository::set_feedback(&db, task.id, Some(true), Some(true))
            .await
            .unwrap();

        let job = JobRepository::create(&db, task.id, JobStage::GenerateSql)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Init);

        let task = TaskRepository::find(&db, task.id).await.unwrap().unwrap();
        assert_eq!(task.sql, None);
        assert_eq!(task.sql_right, None);
        assert_eq!(task.sql_refer, None);
    }

    #[tokio::test]
    async fn claim_only_succeeds_from_init() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let job = JobRepository::create(&db, task.id, JobStage::MatchDoc)
            .await
            .unwrap();

        assert!(JobRepository::claim(&db, job.id).await.unwrap());
        // 二次认领失败：已经是 running
        assert!(!JobRepository::claim(&db, job.id).await.unwrap());
    }

    #[tokio::test]
    async fn fail_does_not_overwrite_canceled() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let job = JobRepository::create(&db, task.id, JobStage::GenerateSql)
            .await
            .unwrap();

        assert!(JobRepository::claim(&db, job.id).await.unwrap());
        assert!(JobRepository::cancel(&db, job.id).await.unwrap());

        assert!(!JobRepository::fail(&db, job.id, "boom").await.unwrap());
        assert!(!JobRepository::succeed(&db, job.id, 12).await.unwrap());

        let job = JobRepository::find(&db, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert_eq!(job.error_message, None);
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_noop() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let job = JobRepository::create(&db, task.id, JobStage::MatchDoc)
            .await
            .unwrap();

        assert!(JobRepository::claim(&db, job.id).await.unwrap());
        assert!(JobRepository::succeed(&db, job.id, 5).await.unwrap());
        assert!(!JobRepository::cancel(&db, job.id).await.unwrap());

        let job = JobRepository::find(&db, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.cost_time_ms, 5);
    }

    #[tokio::test]
    async fn init_ids_returns_creation_order() {
        let db = test_db().await;
        let project = seed_project(&db).await;
        let task = seed_task(&db, project.id, &TaskOptions::default()).await;
        let a = JobRepository::create(&db, task.id, JobStage::MatchDoc)
            .await
            .unwrap();
        let b = JobRepository::create(&db, task.id, JobStage::MatchSqlLog)
            .await
            .unwrap();

        let ids = JobRepository::init_ids(&db).await.unwrap();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
