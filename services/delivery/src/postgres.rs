//! `PostgreSQL` delivery repository.

use crate::domain::{Created, Delivery, TransitionPolicy, UNKNOWN_ADDRESS};
use crate::repository::DeliveryRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fulfillment_core::{DeliveryStatus, ServiceError, ServiceResult};
use fulfillment_postgres::DbResultExt;
use sqlx::{PgPool, Postgres, Transaction};

const COLUMNS: &str = "id, order_id, status, address, courier, updated_at";

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    order_id: i64,
    status: String,
    address: String,
    courier: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = ServiceError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            tracing::error!(order_id = row.order_id, status = %row.status, "Unknown delivery status in storage");
            ServiceError::internal("corrupt delivery row")
        })?;

        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            status,
            address: row.address,
            courier: row.courier,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UpsertedRow {
    #[sqlx(flatten)]
    row: DeliveryRow,
    inserted: bool,
}

/// Deliveries stored in `deliveries`, one row per order.
#[derive(Clone, Debug)]
pub struct PostgresDeliveryRepository {
    pool: PgPool,
}

impl PostgresDeliveryRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRepository for PostgresDeliveryRepository {
    async fn create_pending(
        &self,
        order_id: i64,
        address: &str,
        courier: &str,
    ) -> ServiceResult<Created> {
        // `xmax = 0` only for a freshly inserted tuple; a backfill update also returns a row.
        let upserted: Option<UpsertedRow> = sqlx::query_as(&format!(
            "INSERT INTO deliveries (order_id, status, address, courier) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (order_id) DO UPDATE \
                 SET address = EXCLUDED.address, updated_at = NOW() \
                 WHERE deliveries.address = $5 \
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(order_id)
        .bind(DeliveryStatus::Pending.as_str())
        .bind(address)
        .bind(courier)
        .bind(UNKNOWN_ADDRESS)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        match upserted {
            Some(UpsertedRow {
                row,
                inserted: true,
            }) => Ok(Created::New(row.try_into()?)),
            Some(UpsertedRow { row, .. }) => Ok(Created::Existing(row.try_into()?)),
            None => self
                .find(order_id)
                .await?
                .map(Created::Existing)
                .ok_or_else(|| ServiceError::internal("delivery vanished during upsert")),
        }
    }

    async fn set_status(
        &self,
        order_id: i64,
        status: DeliveryStatus,
        policy: TransitionPolicy,
        courier: &str,
    ) -> ServiceResult<Delivery> {
        let mut tx = self.pool.begin().await.map_db_err()?;

        let row = match transition_locked(&mut tx, order_id, status, policy).await? {
            Some(row) => row,
            None => {
                let inserted: Option<DeliveryRow> = sqlx::query_as(&format!(
                    "INSERT INTO deliveries (order_id, status, address, courier) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (order_id) DO NOTHING \
                     RETURNING {COLUMNS}"
                ))
                .bind(order_id)
                .bind(status.as_str())
                .bind(UNKNOWN_ADDRESS)
                .bind(courier)
                .fetch_optional(&mut *tx)
                .await
                .map_db_err()?;

                match inserted {
                    Some(row) => row,
                    // A concurrent insert won the key; apply the change to its row.
                    None => transition_locked(&mut tx, order_id, status, policy)
                        .await?
                        .ok_or_else(|| ServiceError::internal("delivery vanished during update"))?,
                }
            },
        };

        tx.commit().await.map_db_err()?;
        row.try_into()
    }

    async fn find(&self, order_id: i64) -> ServiceResult<Option<Delivery>> {
        let row: Option<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM deliveries WHERE order_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.map(Delivery::try_from).transpose()
    }

    async fn ping(&self) -> bool {
        fulfillment_postgres::ping(&self.pool).await
    }
}

/// Lock the order's row and move it to `status` if `policy` allows.
///
/// `None` when the order has no delivery row.
async fn transition_locked(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
    status: DeliveryStatus,
    policy: TransitionPolicy,
) -> ServiceResult<Option<DeliveryRow>> {
    let current: Option<DeliveryRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM deliveries WHERE order_id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await
    .map_db_err()?;

    let Some(current) = current else {
        return Ok(None);
    };
    let current: Delivery = current.try_into()?;
    policy.check(current.status, status)?;

    sqlx::query_as(&format!(
        "UPDATE deliveries SET status = $1, updated_at = NOW() \
         WHERE order_id = $2 RETURNING {COLUMNS}"
    ))
    .bind(status.as_str())
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await
    .map_db_err()
    .map(Some)
}
