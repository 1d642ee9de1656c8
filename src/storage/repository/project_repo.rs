use crate::storage::entity::project::{self, ActiveModel as ProjectActiveModel, Entity as Project};
use crate::storage::repository::now_ts;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

pub struct ProjectRepository;

impl ProjectRepository {
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        db_type: &str,
        db_version: Option<&str>,
    ) -> Result<project::Model, DbErr> {
        let now = now_ts();
        let model = ProjectActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            db_type: Set(db_type.to_string()),
            db_version: Set(db_version.map(|s| s.to_string())),
            cur_version: Set(1),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await
    }

    pub async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<project::Model>, DbErr> {
        Project::find_by_id(id).one(db).await
    }

    pub async fn all(db: &DatabaseConnection) -> Result<Vec<project::Model>, DbErr> {
        Project::find().order_by_asc(project::Column::Id).all(db).await
    }

    /// DDL 导入完成后推进索引版本。导入期间 cur_version 保持不动，
    /// 避免清理扫描在导入途中就把未更新的旧记录判成过期
    pub async fn set_cur_version(
        db: &DatabaseConnection,
        id: i32,
        cur_version: i32,
    ) -> Result<(), DbErr> {
        Project::update_many()
            .col_expr(project::Column::CurVersion, Expr::value(cur_version))
            .col_expr(
                project::Column::Version,
                Expr::col(project::Column::Version).add(1),
            )
            .col_expr(project::Column::UpdatedAt, Expr::value(now_ts()))
            .filter(project::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }
}
