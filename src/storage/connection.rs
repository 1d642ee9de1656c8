use crate::storage::entity;
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    db.execute(sea_orm::Statement::from_string(
        sea_orm::DatabaseBackend::Sqlite,
        "PRAGMA journal_mode=WAL;".to_string(),
    ))
    .await?;

    init_schema(&db).await?;

    info!("Database connection established with WAL mode and table initialized.");

    Ok(db)
}

/// 按实体建表（如果不存在），测试用内存库也走这里
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    macro_rules! create_table {
        ($entity:path) => {
            let stmt = builder.build(schema.create_table_from_entity($entity).if_not_exists());
            db.execute(stmt).await?;
        };
    }

    create_table!(entity::project::Entity);
    create_table!(entity::task::Entity);
    create_table!(entity::job::Entity);
    create_table!(entity::task_table::Entity);
    create_table!(entity::task_column::Entity);
    create_table!(entity::task_doc::Entity);
    create_table!(entity::task_sql::Entity);
    create_table!(entity::definition_table::Entity);
    create_table!(entity::definition_column::Entity);
    create_table!(entity::definition_doc::Entity);
    create_table!(entity::definition_rule::Entity);
    create_table!(entity::definition_relation::Entity);

    // 唯一索引：同一项目内的定义自然键不重复
    let index_stmts = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_definition_tables_unique ON definition_tables(project_id, table_name);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_definition_columns_unique ON definition_columns(project_id, table_name, column_name);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_definition_relations_unique ON definition_relations(project_id, table1, column1, table2, column2);",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);",
        "CREATE INDEX IF NOT EXISTS idx_definition_tables_waiting ON definition_tables(waiting);",
        "CREATE INDEX IF NOT EXISTS idx_definition_columns_waiting ON definition_columns(waiting);",
        "CREATE INDEX IF NOT EXISTS idx_definition_docs_waiting ON definition_docs(waiting);",
        "CREATE INDEX IF NOT EXISTS idx_task_tables_task_id ON task_tables(task_id);",
        "CREATE INDEX IF NOT EXISTS idx_task_columns_task_id ON task_columns(task_id);",
        "CREATE INDEX IF NOT EXISTS idx_task_docs_task_id ON task_docs(task_id);",
        "CREATE INDEX IF NOT EXISTS idx_task_sqls_task_id ON task_sqls(task_id);",
    ];
    for sql in index_stmts {
        db.execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            sql.to_string(),
        ))
        .await?;
    }

    Ok(())
}
