//! `PostgreSQL` order repository.

use crate::domain::{CustomerContact, Medicine, Order, OrderDetail, OrderItem, OrderWithItems, PLACED};
use crate::pricing::{ValidatedOrder, price_order};
use crate::repository::OrderRepository;
use async_trait::async_trait;
use fulfillment_core::{ServiceError, ServiceResult};
use fulfillment_postgres::DbResultExt;
use sqlx::PgPool;
use std::collections::HashMap;

const ORDER_COLUMNS: &str = "id, user_id, total_amount, status, delivery_address, created_at";

const ITEMS_WITH_NAMES: &str = r"
    SELECT oi.id, oi.order_id, oi.medicine_id, oi.quantity, oi.price,
           m.name AS medicine_name
    FROM order_items oi
    LEFT JOIN medicines m ON m.id = oi.medicine_id
    WHERE oi.order_id = ANY($1)
    ORDER BY oi.order_id, oi.id
";

/// Orders stored in `orders` / `order_items`, stock in `medicines`.
#[derive(Clone, Debug)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for(&self, order_ids: &[i64]) -> ServiceResult<HashMap<i64, Vec<OrderItem>>> {
        let items: Vec<OrderItem> = sqlx::query_as(ITEMS_WITH_NAMES)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await
            .map_db_err()?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }
        Ok(by_order)
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn place(&self, user_id: i64, order: &ValidatedOrder) -> ServiceResult<OrderDetail> {
        // Dropping `tx` on any early return rolls the whole order back.
        let mut tx = self.pool.begin().await.map_db_err()?;

        let rows: Vec<Medicine> = sqlx::query_as(
            "SELECT id, name, price, stock FROM medicines WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(order.medicine_ids())
        .fetch_all(&mut *tx)
        .await
        .map_db_err()?;

        let catalog: HashMap<i64, Medicine> = rows.into_iter().map(|m| (m.id, m)).collect();
        let priced = price_order(order, &catalog)?;

        let created: Order = sqlx::query_as(&format!(
            "INSERT INTO orders (user_id, total_amount, status, delivery_address) \
             VALUES ($1, $2, $3, $4) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(priced.total)
        .bind(PLACED)
        .bind(&order.address)
        .fetch_one(&mut *tx)
        .await
        .map_db_err()?;

        let mut items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let mut item: OrderItem = sqlx::query_as(
                "INSERT INTO order_items (order_id, medicine_id, quantity, price) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, order_id, medicine_id, quantity, price",
            )
            .bind(created.id)
            .bind(line.medicine_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .fetch_one(&mut *tx)
            .await
            .map_db_err()?;
            item.medicine_name = Some(line.name.clone());

            let decremented = sqlx::query(
                "UPDATE medicines SET stock = stock - $1 WHERE id = $2 AND stock >= $1",
            )
            .bind(line.quantity)
            .bind(line.medicine_id)
            .execute(&mut *tx)
            .await
            .map_db_err()?;

            if decremented.rows_affected() == 0 {
                return Err(ServiceError::conflict(format!(
                    "insufficient stock for medicine {}",
                    line.medicine_id
                )));
            }

            items.push(item);
        }

        tx.commit().await.map_db_err()?;

        tracing::debug!(order_id = created.id, user_id, lines = items.len(), "Order committed");

        Ok(OrderDetail {
            order: created,
            items,
        })
    }

    async fn customer_contact(&self, user_id: i64) -> ServiceResult<Option<CustomerContact>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT email, name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_db_err()?;

        Ok(row.map(|(email, name)| CustomerContact { email, name }))
    }

    async fn list_for_user(&self, user_id: i64) -> ServiceResult<Vec<OrderWithItems>> {
        let orders: Vec<Order> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_db_err()?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let mut items = self.items_for(&ids).await?;

        Ok(orders
            .into_iter()
            .map(|order| OrderWithItems {
                items: items.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    async fn list_all(&self) -> ServiceResult<Vec<Order>> {
        sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_db_err()
    }

    async fn find_for_user(
        &self,
        order_id: i64,
        user_id: i64,
    ) -> ServiceResult<Option<OrderDetail>> {
        let order: Option<Order> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = self
            .items_for(&[order.id])
            .await?
            .remove(&order.id)
            .unwrap_or_default();

        Ok(Some(OrderDetail { order, items }))
    }

    async fn ping(&self) -> bool {
        fulfillment_postgres::ping(&self.pool).await
    }
}
