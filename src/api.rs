use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::errors::AppError;
use crate::orders::{Order, OrderSide, OrderStatus, OrderType};
use crate::state::AppState;
use crate::store::OrderFilter;

/// Response envelope shared by every route: `error` is null on success and a
/// message on failure; `result` carries the payload.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub error: Option<String>,
    pub result: T,
}

impl<T: Serialize> Envelope<T> {
    fn ok(result: T) -> Json<Self> {
        Json(Self {
            error: None,
            result,
        })
    }
}

/// Request payload for `POST /order/submit`.
///
/// Fields default to their zero values so range errors come back through the
/// envelope rather than as serde rejections.
#[derive(Debug, Deserialize)]
pub struct SubmitOrderReq {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default, rename = "type")]
    pub kind: i32,
    #[serde(default)]
    pub side: i32,
}

fn validate(req: &SubmitOrderReq) -> Result<(OrderType, OrderSide), AppError> {
    if req.user_id <= 0 {
        return Err(AppError::Validation("user_id is required".into()));
    }
    if req.symbol.is_empty() {
        return Err(AppError::Validation("symbol is required".into()));
    }
    let kind = OrderType::try_from(req.kind).map_err(AppError::Validation)?;
    let side = OrderSide::try_from(req.side).map_err(AppError::Validation)?;
    if req.amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    if req.price < Decimal::ZERO {
        return Err(AppError::Validation("price must not be negative".into()));
    }
    if kind == OrderType::Limit && req.price <= Decimal::ZERO {
        return Err(AppError::Validation(
            "limit orders require a positive price".into(),
        ));
    }
    Ok((kind, side))
}

/// `POST /order/submit`
///
/// Persists the order with `status = Init`, then hands it to the symbol's
/// engine on a detached task so a full submit queue never stalls the
/// response. 400 on validation failure, 500 on store failure.
pub async fn submit_order(
    State(state): State<AppState>,
    Json(req): Json<SubmitOrderReq>,
) -> Result<Json<Envelope<Value>>, AppError> {
    let (kind, side) = validate(&req)?;

    let now = Utc::now();
    let mut order = Order {
        id: 0,
        user_id: req.user_id,
        symbol: req.symbol,
        // market orders carry no price; never compare it
        price: if kind == OrderType::Market {
            Decimal::ZERO
        } else {
            req.price
        },
        amount: req.amount,
        filled: Decimal::ZERO,
        kind,
        side,
        status: OrderStatus::Init,
        create_time: now,
        update_time: now,
    };
    order.id = state.orders.create(&order).await?;
    info!(order_id = order.id, symbol = %order.symbol, "order accepted");

    let engine = state.registry.get(&order.symbol).await;
    engine.ensure_healthy()?;
    tokio::spawn(async move {
        if let Err(err) = engine.submit(order).await {
            error!(%err, "order rejected by engine");
        }
    });

    Ok(Envelope::ok(json!({})))
}

/// `PUT /order/cancel/{order_id}`
///
/// Only orders still in `Init` can be cancelled through the ingress; the
/// engine resolves the race against concurrent fills on its own clock.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Envelope<i64>>, AppError> {
    let order = state.orders.load(order_id).await?.ok_or(AppError::NotFound)?;
    if order.status != OrderStatus::Init {
        return Err(AppError::InvalidState);
    }

    state
        .orders
        .update_status(order_id, OrderStatus::Cancelled)
        .await?;

    let engine = state.registry.get(&order.symbol).await;
    tokio::spawn(async move {
        if let Err(err) = engine.submit_cancel(order_id).await {
            error!(%err, "cancel rejected by engine");
        }
    });

    Ok(Envelope::ok(order_id))
}

/// `GET /order/{order_id}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Envelope<Order>>, AppError> {
    let order = state.orders.load(order_id).await?.ok_or(AppError::NotFound)?;
    Ok(Envelope::ok(order))
}

/// Query parameters for `GET /order`. Zero-valued filters are omitted from
/// the lookup.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersReq {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, rename = "type")]
    pub kind: i32,
    #[serde(default)]
    pub side: i32,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub limit: i64,
}

/// `GET /order?user_id=…&symbol=…&type=…&side=…&page=…&limit=…`
pub async fn list_orders(
    State(state): State<AppState>,
    Query(req): Query<ListOrdersReq>,
) -> Result<Json<Envelope<Vec<Order>>>, AppError> {
    if req.user_id <= 0 {
        return Err(AppError::Validation("user_id is required".into()));
    }

    let filter = OrderFilter {
        user_id: req.user_id,
        symbol: req.symbol,
        kind: req.kind,
        side: req.side,
        page: if req.page < 1 { 1 } else { req.page },
        limit: if req.limit < 1 { 100 } else { req.limit },
    };
    Ok(Envelope::ok(state.orders.list(&filter).await?))
}

/// `GET /book/{symbol}`
///
/// Live snapshot of the symbol's resting orders, best price first per side.
/// A symbol with no engine yet simply has an empty book.
pub async fn get_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<Envelope<Value>> {
    let (bids, asks) = match state.registry.find(&symbol).await {
        Some(engine) => (engine.bids(), engine.asks()),
        None => (Vec::new(), Vec::new()),
    };
    Envelope::ok(json!({ "bids": bids, "asks": asks }))
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/order/submit", post(submit_order))
        .route("/order/cancel/{order_id}", put(cancel_order))
        .route("/order/{order_id}", get(get_order))
        .route("/order", get(list_orders))
        .route("/book/{symbol}", get(get_book))
        .with_state(state)
}
