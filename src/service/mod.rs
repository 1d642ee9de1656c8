pub mod def_service;
pub mod task_service;

pub use def_service::{ColumnDefInput, DefService, RefreshIndexRequest, TableDefInput};
pub use task_service::TaskService;
