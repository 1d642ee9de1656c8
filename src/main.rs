use anyhow::Context;
use chat2sql::ai::OpenAiProvider;
use chat2sql::pipeline::{JobRunner, PipelineContext, Stores};
use chat2sql::scheduler::Scheduler;
use chat2sql::storage::establish_connection;
use chat2sql::vector::{
    ChromaStore, MemoryVectorStore, TranslateStore, Translator, VectorStore,
    COLUMN_DEF_COLLECTION, DOC_DEF_COLLECTION, SQL_LOG_COLLECTION, TABLE_DEF_COLLECTION,
};
use chat2sql::vector_sync::VectorSyncService;
use log::{info, warn};
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("chat2sql", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    // 初始化数据库
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://chat2sql.db?mode=rwc".to_string());
    let db = establish_connection(&db_url)
        .await
        .context("数据库连接失败")?;
    let db = Arc::new(db);

    // AI 网关
    let provider = OpenAiProvider::from_env().context("初始化 AI 网关失败")?;
    let model = provider.default_model.clone();
    let temperature = provider.default_temperature;
    info!("AI 网关就绪，模型: {}", model);

    // 向量索引：配了 CHROMA_URL 用 Chroma，否则退回进程内实现
    let stores = match std::env::var("CHROMA_URL") {
        Ok(url) => {
            info!("使用 Chroma 向量索引: {}", url);
            Stores {
                table_defs: Arc::new(ChromaStore::new(&url, TABLE_DEF_COLLECTION)),
                column_defs: Arc::new(ChromaStore::new(&url, COLUMN_DEF_COLLECTION)),
                docs: Arc::new(ChromaStore::new(&url, DOC_DEF_COLLECTION)),
                sql_logs: Arc::new(ChromaStore::new(&url, SQL_LOG_COLLECTION)),
            }
        }
        Err(_) => {
            warn!("未配置 CHROMA_URL，使用进程内向量索引（重启即失，仅适合体验）");
            Stores {
                table_defs: Arc::new(MemoryVectorStore::new()),
                column_defs: Arc::new(MemoryVectorStore::new()),
                docs: Arc::new(MemoryVectorStore::new()),
                sql_logs: Arc::new(MemoryVectorStore::new()),
            }
        }
    };

    // 翻译层：配了 Azure key 才包一层
    let translator = Arc::new(Translator::from_env());
    let stores = if translator.is_active() {
        let target_lang =
            std::env::var("TRANSLATE_TARGET_LANG").unwrap_or_else(|_| "en".to_string());
        info!("翻译层已启用，目标语言: {}", target_lang);
        let wrap = |inner: Arc<dyn VectorStore>| -> Arc<dyn VectorStore> {
            Arc::new(TranslateStore::new(inner, translator.clone(), &target_lang))
        };
        Stores {
            table_defs: wrap(stores.table_defs),
            column_defs: wrap(stores.column_defs),
            docs: wrap(stores.docs),
            sql_logs: wrap(stores.sql_logs),
        }
    } else {
        stores
    };

    let ctx = Arc::new(PipelineContext {
        db: db.clone(),
        provider: Arc::new(provider),
        stores: stores.clone(),
        model,
        temperature,
    });

    let runner = Arc::new(JobRunner::new(ctx));
    let sync = Arc::new(VectorSyncService::new(db, stores));
    let mut scheduler = Scheduler::new(runner, sync);
    scheduler.start();

    info!("chat2sql 流水线已启动，Ctrl-C 退出");
    tokio::signal::ctrl_c().await.context("等待退出信号失败")?;
    scheduler.stop().await;
    Ok(())
}
