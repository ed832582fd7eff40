use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trade records one matched fill between two orders.
///
/// - The price always comes from the maker (the resting order).
/// - The taker is the incoming order that triggered the fill.
/// - `id` is assigned by the trade store on insert and is zero until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trade {
    pub id: i64,
    pub taker_order_id: i64,
    pub maker_order_id: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}
