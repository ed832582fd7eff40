#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use trade_engine::engine::Backends;
use trade_engine::orders::{Order, OrderStatus};
use trade_engine::store::{OrderFilter, OrderStore, StoreResult, TradeStore};
use trade_engine::trade::Trade;
use trade_engine::wallet::NullSettlement;

/// In-memory order store backing the integration tests; ids are assigned
/// sequentially like the database sequence would.
#[derive(Default)]
pub struct MemOrderStore {
    next_id: AtomicI64,
    rows: Mutex<HashMap<i64, Order>>,
}

impl MemOrderStore {
    pub fn snapshot(&self, order_id: i64) -> Option<Order> {
        self.rows.lock().unwrap().get(&order_id).cloned()
    }
}

#[async_trait]
impl OrderStore for MemOrderStore {
    async fn create(&self, order: &Order) -> StoreResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = order.clone();
        stored.id = id;
        self.rows.lock().unwrap().insert(id, stored);
        Ok(id)
    }

    async fn load(&self, order_id: i64) -> StoreResult<Option<Order>> {
        Ok(self.snapshot(order_id))
    }

    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let rows = self.rows.lock().unwrap();
        let mut matched: Vec<Order> = rows
            .values()
            .filter(|o| o.user_id == filter.user_id)
            .filter(|o| filter.symbol.is_empty() || o.symbol == filter.symbol)
            .filter(|o| filter.kind == 0 || i32::from(o.kind) == filter.kind)
            .filter(|o| filter.side == 0 || i32::from(o.side) == filter.side)
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.id);
        let offset = ((filter.page.max(1) - 1) * filter.limit) as usize;
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update(&self, order: &Order) -> StoreResult<()> {
        self.rows.lock().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> StoreResult<()> {
        if let Some(order) = self.rows.lock().unwrap().get_mut(&order_id) {
            order.status = status;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemTradeStore {
    rows: Mutex<Vec<Trade>>,
}

impl MemTradeStore {
    pub fn all(&self) -> Vec<Trade> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeStore for MemTradeStore {
    async fn insert_batch(&self, trades: &[Trade]) -> StoreResult<()> {
        self.rows.lock().unwrap().extend_from_slice(trades);
        Ok(())
    }
}

pub fn test_backends() -> (Backends, Arc<MemOrderStore>, Arc<MemTradeStore>) {
    let orders = Arc::new(MemOrderStore::default());
    let trades = Arc::new(MemTradeStore::default());
    let backends = Backends {
        orders: orders.clone(),
        trades: trades.clone(),
        settlement: Arc::new(NullSettlement),
    };
    (backends, orders, trades)
}

/// Poll `cond` until it holds, panicking after two seconds. The engine
/// workers apply events asynchronously, so tests observe their effects
/// through the stores rather than through return values.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
