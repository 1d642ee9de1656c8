pub mod definition_column;
pub mod definition_doc;
pub mod definition_relation;
pub mod definition_rule;
pub mod definition_table;
pub mod job;
pub mod project;
pub mod task;
pub mod task_column;
pub mod task_doc;
pub mod task_sql;
pub mod task_table;

pub use job::{JobStage, JobStatus};
pub use task::TaskOptions;
