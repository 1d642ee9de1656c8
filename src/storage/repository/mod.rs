pub mod def_repo;
pub mod job_repo;
pub mod project_repo;
pub mod task_repo;

pub use def_repo::{reverse_relation_type, DefRepository};
pub use job_repo::JobRepository;
pub use project_repo::ProjectRepository;
pub use task_repo::TaskRepository;

/// 秒级时间戳，实体统一用它填 created_at/updated_at
pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
