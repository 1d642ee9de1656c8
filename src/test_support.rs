//! 测试公共设施：内存库、种子数据、脚本化的 AI 回复、内存向量集合

use crate::ai::{ChatRequest, ChatResponse, LlmError, LlmProvider};
use crate::pipeline::{PipelineContext, Stores};
use crate::storage::entity::{project, task, TaskOptions};
use crate::storage::init_schema;
use crate::storage::repository::{ProjectRepository, TaskRepository};
use crate::vector::MemoryVectorStore;
use crate::vector_sync::VectorSyncService;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 单连接内存 SQLite。多连接会各自拿到一个空库，所以连接池收成 1
pub async fn test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect memory db");
    init_schema(&db).await.expect("init schema");
    db
}

pub async fn seed_project(db: &DatabaseConnection) -> project::Model {
    ProjectRepository::create(db, "demo", "mysql", Some("8.0"))
        .await
        .expect("create project")
}

pub async fn seed_task(
    db: &DatabaseConnection,
    project_id: i32,
    options: &TaskOptions,
) -> task::Model {
    TaskRepository::create(db, project_id, "统计上月每个客户的订单数", None, options, None)
        .await
        .expect("create task")
}

/// 按脚本回放回复的 AI 网关替身，脚本耗尽后报错
pub struct StubProvider {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.prompts.lock().unwrap().push(req.user);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(ChatResponse { text, raw: None }),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::InvalidResponse("no scripted reply".to_string())),
        }
    }
}

/// 保留具体类型的内存集合，方便测试断言内容
pub struct TestStores {
    pub table_defs: Arc<MemoryVectorStore>,
    pub column_defs: Arc<MemoryVectorStore>,
    pub docs: Arc<MemoryVectorStore>,
    pub sql_logs: Arc<MemoryVectorStore>,
}

impl TestStores {
    fn new() -> Self {
        Self {
            table_defs: Arc::new(MemoryVectorStore::new()),
            column_defs: Arc::new(MemoryVectorStore::new()),
            docs: Arc::new(MemoryVectorStore::new()),
            sql_logs: Arc::new(MemoryVectorStore::new()),
        }
    }

    fn as_stores(&self) -> Stores {
        Stores {
            table_defs: self.table_defs.clone(),
            column_defs: self.column_defs.clone(),
            docs: self.docs.clone(),
            sql_logs: self.sql_logs.clone(),
        }
    }
}

pub fn test_ctx(
    db: DatabaseConnection,
    provider: Arc<dyn LlmProvider>,
) -> (Arc<PipelineContext>, TestStores) {
    let stores = TestStores::new();
    let ctx = PipelineContext {
        db: Arc::new(db),
        provider,
        stores: stores.as_stores(),
        model: "test-model".to_string(),
        temperature: 0.2,
    };
    (Arc::new(ctx), stores)
}

pub fn test_sync(
    db: DatabaseConnection,
) -> (VectorSyncService, TestStores, Arc<DatabaseConnection>) {
    let stores = TestStores::new();
    let db = Arc::new(db);
    let sync = VectorSyncService::new(db.clone(), stores.as_stores());
    (sync, stores, db)
}
