use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::entities::progress;
use crate::errors::{CoreError, CoreResult};

/// Sink for coarse progress counters of long-running operations.
///
/// Updates are fire-and-forget: implementations log their own failures and
/// never hand them back to the operation being tracked.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn set_total(&self, id: &str, total: u64);
    async fn increment(&self, id: &str);
    async fn set_current(&self, id: &str, current: u64);
}

pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn set_total(&self, _id: &str, _total: u64) {}
    async fn increment(&self, _id: &str) {}
    async fn set_current(&self, _id: &str, _current: u64) {}
}

/// Progress records kept in the `progress` table, polled by clients while
/// an export or restore runs.
#[derive(Clone)]
pub struct DatabaseProgress {
    db: DatabaseConnection,
}

impl DatabaseProgress {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: Option<&str>, kind: &str) -> CoreResult<progress::Model> {
        self.insert(&Uuid::new_v4().to_string(), user_id, kind).await
    }

    /// Binds a client-chosen id to `user_id`. An id another user already
    /// holds is rejected, so counters are only ever written for their owner.
    pub async fn claim(&self, id: &str, user_id: &str, kind: &str) -> CoreResult<progress::Model> {
        let existing = progress::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load progress").with_source(e))?;
        match existing {
            Some(record) if record.user_id.as_deref() == Some(user_id) => Ok(record),
            Some(_) => Err(CoreError::validation(format!(
                "Progress id '{}' is already in use",
                id
            ))),
            None => self.insert(id, Some(user_id), kind).await,
        }
    }

    async fn insert(
        &self,
        id: &str,
        user_id: Option<&str>,
        kind: &str,
    ) -> CoreResult<progress::Model> {
        let now = Utc::now();
        let model = progress::Model {
            id: id.to_string(),
            user_id: user_id.map(str::to_string),
            kind: kind.to_string(),
            total: 0,
            current: 0,
            created_at: now,
            updated_at: now,
        };
        progress::Entity::insert(progress::ActiveModel {
            id: Set(model.id.clone()),
            user_id: Set(model.user_id.clone()),
            kind: Set(model.kind.clone()),
            total: Set(0),
            current: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .exec_without_returning(&self.db)
        .await
        .map_err(|e| CoreError::internal("Failed to create progress record").with_source(e))?;
        Ok(model)
    }

    pub async fn get(&self, id: &str) -> CoreResult<progress::Model> {
        progress::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load progress").with_source(e))?
            .ok_or_else(|| CoreError::not_found("Progress", id))
    }
}

#[async_trait]
impl ProgressReporter for DatabaseProgress {
    async fn set_total(&self, id: &str, total: u64) {
        let now = Utc::now();
        // Callers may report against an id they never created
        let result = progress::Entity::insert(progress::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(None),
            kind: Set("generic".to_string()),
            total: Set(total as i64),
            current: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(progress::Column::Id)
                .update_columns([
                    progress::Column::Total,
                    progress::Column::Current,
                    progress::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await;

        match result {
            Ok(_) => debug!("Progress {}: total {}", id, total),
            Err(e) => warn!("Failed to set progress total for {}: {}", id, e),
        }
    }

    async fn increment(&self, id: &str) {
        let result = progress::Entity::update_many()
            .col_expr(
                progress::Column::Current,
                Expr::col(progress::Column::Current).add(1),
            )
            .col_expr(progress::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(progress::Column::Id.eq(id))
            .exec(&self.db)
            .await;

        if let Err(e) = result {
            warn!("Failed to increment progress {}: {}", id, e);
        }
    }

    async fn set_current(&self, id: &str, current: u64) {
        let result = progress::Entity::update_many()
            .col_expr(progress::Column::Current, Expr::value(current as i64))
            .col_expr(progress::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(progress::Column::Id.eq(id))
            .exec(&self.db)
            .await;

        if let Err(e) = result {
            warn!("Failed to set progress {} to {}: {}", id, current, e);
        }
    }
}

/// Reports to `reporter` only when the caller supplied a progress id.
pub(crate) struct ProgressHandle<'a> {
    reporter: &'a dyn ProgressReporter,
    id: Option<&'a str>,
}

impl<'a> ProgressHandle<'a> {
    pub(crate) fn new(reporter: &'a dyn ProgressReporter, id: Option<&'a str>) -> Self {
        Self { reporter, id }
    }

    pub(crate) async fn set_total(&self, total: u64) {
        if let Some(id) = self.id {
            self.reporter.set_total(id, total).await;
        }
    }

    pub(crate) async fn set_current(&self, current: u64) {
        if let Some(id) = self.id {
            self.reporter.set_current(id, current).await;
        }
    }
}
