use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the market the order is on.
///
/// # Intuition
/// - `Buy` (bid): the trader wants to purchase the asset. Bids are matched
///   from **highest to lowest price** because a higher price is more
///   aggressive.
/// - `Sell` (ask): the trader wants to sell. Asks are matched from
///   **lowest to highest price**.
///
/// Serialized as `1` / `2` on the wire and in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum OrderSide {
    Buy = 1,
    Sell = 2,
}

impl TryFrom<i32> for OrderSide {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderSide::Buy),
            2 => Ok(OrderSide::Sell),
            other => Err(format!("invalid order side: {other}")),
        }
    }
}

impl From<OrderSide> for i32 {
    fn from(side: OrderSide) -> i32 {
        side as i32
    }
}

/// Whether an order executes at a specific price or at whatever the book
/// offers.
///
/// - `Limit`: executes at its price or better; any residual rests.
/// - `Market`: executes immediately against the best available prices; any
///   residual is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum OrderType {
    Limit = 1,
    Market = 2,
}

impl TryFrom<i32> for OrderType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderType::Limit),
            2 => Ok(OrderType::Market),
            other => Err(format!("invalid order type: {other}")),
        }
    }
}

impl From<OrderType> for i32 {
    fn from(kind: OrderType) -> i32 {
        kind as i32
    }
}

/// Lifecycle of an order. `Cancelled` is terminal; `Filled` holds exactly
/// when `filled == amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum OrderStatus {
    Init = 1,
    Partial = 2,
    Filled = 3,
    Cancelled = 4,
}

impl TryFrom<i32> for OrderStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderStatus::Init),
            2 => Ok(OrderStatus::Partial),
            3 => Ok(OrderStatus::Filled),
            4 => Ok(OrderStatus::Cancelled),
            other => Err(format!("invalid order status: {other}")),
        }
    }
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> i32 {
        status as i32
    }
}

/// An order submitted by a trader.
///
/// `id` is assigned by the order store before the order reaches an engine.
/// `price` is zero for market orders and must not be compared for them.
/// `filled` only ever grows and never exceeds `amount`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: OrderType,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Order {
    /// Quantity still open for matching.
    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }

    pub fn is_filled(&self) -> bool {
        self.filled >= self.amount
    }
}
