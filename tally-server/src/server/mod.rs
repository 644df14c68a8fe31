pub mod app;
pub mod error;
pub mod handlers;
pub mod tenant;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

use anyhow::Result;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tally::config::PortabilityConfig;
use tally::database::{connection::*, migrations::Migrator};
use tally::AppContext;
use tracing::info;

pub async fn connect(database_path: &str) -> Result<DatabaseConnection> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;
    Migrator::up(&db, None).await?;
    info!("Database migrations completed");
    Ok(db)
}

pub async fn start_server(
    port: u16,
    database_path: &str,
    cors_origin: Option<&str>,
    config: PortabilityConfig,
) -> Result<()> {
    let db = connect(database_path).await?;
    let ctx = AppContext::new(db, config);
    let app = app::create_app(ctx, cors_origin)?;

    log_routes();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn log_routes() {
    info!("API Endpoints:");
    info!("  GET  /health                          - Health check");
    info!("  GET  /api/backup                      - Download a backup container");
    info!("  POST /api/backup/restore              - Restore a backup container");
    info!("  GET  /api/transactions/export         - Export transactions as CSV");
    info!("  POST /api/transactions/import/parse   - Parse an uploaded CSV");
    info!("  POST /api/transactions/import/save    - Save mapped CSV rows");
    info!("  GET  /api/progress/:id                - Poll operation progress");
}

pub async fn migrate_database(database_path: &str, direction: MigrateDirection) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
