use chrono::Utc;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, DbErr, Set};
use sea_orm_migration::MigratorTrait;

use crate::database::entities::users;

/// In-memory SQLite database with every migration applied.
///
/// A single pooled connection keeps every query on the same in-memory
/// database.
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut opt = sea_orm::ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await?;

    crate::database::migrations::Migrator::up(&db, None).await?;

    Ok(db)
}

pub async fn create_test_user(
    db: &DatabaseConnection,
    id: &str,
) -> Result<users::Model, DbErr> {
    users::ActiveModel {
        id: Set(id.to_string()),
        email: Set(format!("{}@example.com", id)),
        name: Set(id.to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}
