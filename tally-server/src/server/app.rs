use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tally::AppContext;

use super::handlers::{backups, health, progress, transactions_csv};

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
}

pub fn create_app(ctx: AppContext, cors_origin: Option<&str>) -> Result<Router> {
    let body_limit = ctx.config().max_upload_size;
    let state = AppState { ctx };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin '{}'", origin))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state);

    Ok(app)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Backups
        .route("/backup", get(backups::download_backup))
        .route("/backup/restore", post(backups::restore_backup))
        // Transactions CSV
        .route("/transactions/export", get(transactions_csv::export_transactions))
        .route("/transactions/import/parse", post(transactions_csv::parse_upload))
        .route("/transactions/import/save", post(transactions_csv::save_rows))
        // Progress polling
        .route("/progress/:id", get(progress::get_progress))
}
