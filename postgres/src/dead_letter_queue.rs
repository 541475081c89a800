//! Dead Letter Queue (DLQ) for messages the consumers gave up on.
//!
//! Provides persistent storage of messages that were undecodable or failed
//! processing after exhausting their redelivery budget. Enables observability,
//! incident response, and manual replay.

use crate::DbResultExt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fulfillment_core::{DeadLetter, DeadLetterSink, EventBusError, ServiceError, ServiceResult};
use sqlx::{PgPool, Row};

/// Status of a failed message in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqStatus {
    /// Message is pending investigation/replay
    Pending,
    /// Message was replayed or fixed by hand
    Resolved,
    /// Message was permanently discarded (cannot be fixed)
    Discarded,
}

impl DlqStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> ServiceResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(ServiceError::internal(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// An entry in the Dead Letter Queue.
#[derive(Debug, Clone)]
pub struct FailedMessage {
    /// Unique identifier for this DLQ entry
    pub id: i64,
    /// Consumer (queue) that gave up
    pub consumer: String,
    /// Routing key the message was published under
    pub routing_key: String,
    /// Raw message body
    pub payload: Vec<u8>,
    /// Last error message
    pub error_message: String,
    /// Deliveries attempted
    pub attempts: i32,
    /// Current status
    pub status: DlqStatus,
    /// When the message was dead-lettered
    pub failed_at: DateTime<Utc>,
    /// When the entry was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,
    /// Notes about the resolution
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-based Dead Letter Queue.
///
/// # Example
///
/// ```no_run
/// use fulfillment_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list_pending(100).await?;
/// println!("Pending failures: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a failed message to the DLQ.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the insert fails.
    pub async fn add_entry(&self, letter: &DeadLetter) -> ServiceResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_messages (consumer, routing_key, payload, error_message, attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(&letter.consumer)
        .bind(&letter.routing_key)
        .bind(&letter.payload)
        .bind(&letter.error)
        .bind(i32::try_from(letter.attempts).unwrap_or(i32::MAX))
        .fetch_one(&self.pool)
        .await
        .map_db_err()?;

        tracing::warn!(
            dlq_id = id,
            consumer = %letter.consumer,
            routing_key = %letter.routing_key,
            error = %letter.error,
            attempts = letter.attempts,
            "Message added to Dead Letter Queue"
        );

        metrics::counter!("dlq.added", "consumer" => letter.consumer.clone()).increment(1);

        Ok(id)
    }

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the query fails.
    pub async fn list_pending(&self, limit: i64) -> ServiceResult<Vec<FailedMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, consumer, routing_key, payload, error_message, attempts,
                   status, failed_at, resolved_at, resolution_notes
            FROM failed_messages
            WHERE status = 'pending'
            ORDER BY failed_at ASC, id ASC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_db_err()?;

        rows.iter().map(Self::row_to_failed_message).collect()
    }

    /// Mark an entry as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the entry does not exist.
    pub async fn mark_resolved(&self, id: i64, notes: Option<&str>) -> ServiceResult<()> {
        self.close(id, DlqStatus::Resolved, notes).await?;
        metrics::counter!("dlq.resolved").increment(1);
        Ok(())
    }

    /// Mark an entry as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the entry does not exist.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> ServiceResult<()> {
        self.close(id, DlqStatus::Discarded, Some(reason)).await?;
        metrics::counter!("dlq.discarded").increment(1);
        Ok(())
    }

    async fn close(&self, id: i64, status: DlqStatus, notes: Option<&str>) -> ServiceResult<()> {
        let result = sqlx::query(
            r"
            UPDATE failed_messages
            SET status = $1, resolved_at = NOW(), resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_db_err()?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("failed message", id));
        }
        tracing::info!(dlq_id = id, status = status.as_str(), "DLQ entry closed");
        Ok(())
    }

    /// Get count of pending failures.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the query fails.
    pub async fn count_pending(&self) -> ServiceResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_messages WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_db_err()?;
        Ok(count)
    }

    fn row_to_failed_message(row: &sqlx::postgres::PgRow) -> ServiceResult<FailedMessage> {
        let status: String = row.get("status");
        Ok(FailedMessage {
            id: row.get("id"),
            consumer: row.get("consumer"),
            routing_key: row.get("routing_key"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            attempts: row.get("attempts"),
            status: DlqStatus::parse(&status)?,
            failed_at: row.get("failed_at"),
            resolved_at: row.get("resolved_at"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn record(&self, letter: DeadLetter) -> Result<(), EventBusError> {
        self.add_entry(&letter)
            .await
            .map(|_| ())
            .map_err(|e| EventBusError::DeadLetterFailed(e.to_string()))
    }
}
