//! `PostgreSQL` notification repository.

use crate::domain::{NewNotification, Notification, NotificationKind, NotificationScope};
use crate::repository::NotificationRepository;
use async_trait::async_trait;
use fulfillment_core::ServiceResult;
use fulfillment_postgres::DbResultExt;
use sqlx::PgPool;

const COLUMNS: &str = "id, kind, title, message, order_id, user_id, is_read, created_at";

/// Notifications stored in `notifications`; order owners read from `orders`.
#[derive(Clone, Debug)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert(&self, batch: &[NewNotification]) -> ServiceResult<Vec<Notification>> {
        let mut tx = self.pool.begin().await.map_db_err()?;

        let mut stored = Vec::with_capacity(batch.len());
        for new in batch {
            let row: Notification = sqlx::query_as(&format!(
                "INSERT INTO notifications (kind, title, message, order_id, user_id) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
            ))
            .bind(new.kind.as_str())
            .bind(&new.title)
            .bind(&new.message)
            .bind(new.order_id)
            .bind(new.scope.user_id())
            .fetch_one(&mut *tx)
            .await
            .map_db_err()?;
            stored.push(row);
        }

        tx.commit().await.map_db_err()?;
        Ok(stored)
    }

    async fn list(
        &self,
        kind: Option<NotificationKind>,
        scope: NotificationScope,
        limit: i64,
    ) -> ServiceResult<Vec<Notification>> {
        // `IS NOT DISTINCT FROM` lets one statement serve both scopes: NULL
        // selects the operator feed.
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id IS NOT DISTINCT FROM $1 \
               AND ($2::TEXT IS NULL OR kind = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3"
        ))
        .bind(scope.user_id())
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_db_err()
    }

    async fn mark_read(
        &self,
        id: i64,
        scope: NotificationScope,
    ) -> ServiceResult<Option<Notification>> {
        sqlx::query_as(&format!(
            "UPDATE notifications SET is_read = TRUE \
             WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(scope.user_id())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()
    }

    async fn unread_count(&self, scope: NotificationScope) -> ServiceResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id IS NOT DISTINCT FROM $1 AND NOT is_read",
        )
        .bind(scope.user_id())
        .fetch_one(&self.pool)
        .await
        .map_db_err()
    }

    async fn order_owner(&self, order_id: i64) -> ServiceResult<Option<i64>> {
        sqlx::query_scalar("SELECT o.user_id FROM orders o WHERE o.id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_db_err()
    }

    async fn ping(&self) -> bool {
        fulfillment_postgres::ping(&self.pool).await
    }
}
