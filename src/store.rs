use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::orders::{Order, OrderStatus};
use crate::trade::Trade;

/// Errors from the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for order history queries. Zero-valued `kind`/`side` and an empty
/// `symbol` mean "no filter", matching the ingress contract.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: i64,
    pub symbol: String,
    pub kind: i32,
    pub side: i32,
    pub page: i64,
    pub limit: i64,
}

/// Order persistence consumed by the ingress (create/load/list) and by the
/// engine workers (update after matching).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order and return its assigned id.
    async fn create(&self, order: &Order) -> StoreResult<i64>;

    async fn load(&self, order_id: i64) -> StoreResult<Option<Order>>;

    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Upsert of the mutable fields (filled, status, update_time) for a
    /// known id.
    async fn update(&self, order: &Order) -> StoreResult<()>;

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> StoreResult<()>;
}

/// Trade persistence. Batches are inserted atomically.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_batch(&self, trades: &[Trade]) -> StoreResult<()>;
}

/// Run the embedded migrations. Called once at startup.
pub async fn init(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const ORDER_COLUMNS: &str =
    r#"id, user_id, symbol, price, amount, filled, "type", side, status, create_time, update_time"#;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &Order) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"INSERT INTO orders
               (user_id, symbol, price, amount, filled, "type", side, status, create_time, update_time)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING id"#,
        )
        .bind(order.user_id)
        .bind(&order.symbol)
        .bind(order.price)
        .bind(order.amount)
        .bind(order.filled)
        .bind(order.kind)
        .bind(order.side)
        .bind(order.status)
        .bind(order.create_time)
        .bind(order.update_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn load(&self, order_id: i64) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let offset = (filter.page.max(1) - 1) * filter.limit;
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM orders
               WHERE user_id = $1
                 AND ($2 = '' OR symbol = $2)
                 AND ($3 = 0 OR "type" = $3)
                 AND ($4 = 0 OR side = $4)
               ORDER BY id
               LIMIT $5 OFFSET $6"#
        ))
        .bind(filter.user_id)
        .bind(&filter.symbol)
        .bind(filter.kind)
        .bind(filter.side)
        .bind(filter.limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET filled = $2, status = $3, update_time = $4 WHERE id = $1")
            .bind(order.id)
            .bind(order.filled)
            .bind(order.status)
            .bind(order.update_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET status = $2, update_time = now() WHERE id = $1")
            .bind(order_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    /// Persist the whole batch in a single transaction so a match either
    /// appears completely or not at all.
    async fn insert_batch(&self, trades: &[Trade]) -> StoreResult<()> {
        if trades.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for trade in trades {
            sqlx::query(
                r#"INSERT INTO trades (taker_order_id, maker_order_id, price, amount, "timestamp")
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(trade.taker_order_id)
            .bind(trade.maker_order_id)
            .bind(trade.price)
            .bind(trade.amount)
            .bind(trade.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
