use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orderbook::OrderBook;
use crate::orders::{Order, OrderStatus, OrderType};
use crate::store::{OrderStore, TradeStore};
use crate::trade::Trade;
use crate::wallet::Settlement;

/// Bound of each engine's submit and cancel queues. A full queue blocks the
/// producer, which is the backpressure contract of the ingress.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("matching engine for {0} is stopped")]
    Stopped(String),
    #[error("matching engine for {0} halted on an invariant violation")]
    Poisoned(String),
}

/// Boundary handles every engine worker writes through.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub trades: Arc<dyn TradeStore>,
    pub settlement: Arc<dyn Settlement>,
}

/// One matching engine per symbol. All book mutations happen on a single
/// background worker fed by two bounded channels, so events for a symbol are
/// strictly serialised; engines for different symbols run in parallel.
///
/// The book sits behind a mutex only so external observers can take
/// snapshots; the worker is its sole mutator and never holds the lock across
/// an await point.
pub struct MatchingEngine {
    symbol: String,
    book: Arc<Mutex<OrderBook>>,
    submit_tx: mpsc::Sender<Order>,
    cancel_tx: mpsc::Sender<i64>,
    stop: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    poisoned: Arc<AtomicBool>,
}

impl MatchingEngine {
    /// Spawn the worker and return the engine handle.
    pub fn start(symbol: String, backends: Backends, queue_capacity: usize) -> Arc<Self> {
        let (submit_tx, submit_rx) = mpsc::channel(queue_capacity);
        let (cancel_tx, cancel_rx) = mpsc::channel(queue_capacity);
        let stop = CancellationToken::new();
        let book = Arc::new(Mutex::new(OrderBook::new()));
        let poisoned = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            symbol: symbol.clone(),
            book: book.clone(),
            submit_rx,
            cancel_rx,
            stop: stop.clone(),
            backends,
            poisoned: poisoned.clone(),
        };
        let handle = tokio::spawn(worker.run());
        info!(symbol = %symbol, "matching engine started");

        Arc::new(Self {
            symbol,
            book,
            submit_tx,
            cancel_tx,
            stop,
            worker: Mutex::new(Some(handle)),
            poisoned,
        })
    }

    /// A poisoned engine refuses all further events for its symbol.
    pub fn ensure_healthy(&self) -> Result<(), EngineError> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(EngineError::Poisoned(self.symbol.clone()));
        }
        Ok(())
    }

    /// Queue an order for matching. Awaits when the submit queue is full.
    pub async fn submit(&self, order: Order) -> Result<(), EngineError> {
        self.ensure_healthy()?;
        self.submit_tx
            .send(order)
            .await
            .map_err(|_| EngineError::Stopped(self.symbol.clone()))
    }

    /// Queue a cancellation by order id.
    pub async fn submit_cancel(&self, order_id: i64) -> Result<(), EngineError> {
        self.ensure_healthy()?;
        self.cancel_tx
            .send(order_id)
            .await
            .map_err(|_| EngineError::Stopped(self.symbol.clone()))
    }

    /// Consistent point-in-time copy of the resting bids, best price first.
    pub fn bids(&self) -> Vec<Order> {
        self.book.lock().unwrap().bids_snapshot()
    }

    /// Consistent point-in-time copy of the resting asks, best price first.
    pub fn asks(&self) -> Vec<Order> {
        self.book.lock().unwrap().asks_snapshot()
    }

    /// Signal the worker and wait for it to exit. The event being handled
    /// runs to completion; anything still queued is dropped.
    pub async fn stop(&self) {
        self.stop.cancel();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(symbol = %self.symbol, ?err, "engine worker panicked");
            }
        }
    }
}

/// The single consumer of one symbol's event queues.
struct Worker {
    symbol: String,
    book: Arc<Mutex<OrderBook>>,
    submit_rx: mpsc::Receiver<Order>,
    cancel_rx: mpsc::Receiver<i64>,
    stop: CancellationToken,
    backends: Backends,
    poisoned: Arc<AtomicBool>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                Some(order) = self.submit_rx.recv() => {
                    if !self.handle_submit(order).await {
                        break;
                    }
                }
                Some(order_id) = self.cancel_rx.recv() => {
                    self.handle_cancel(order_id).await;
                }
                else => break,
            }
        }
        info!(symbol = %self.symbol, "matching engine worker exited");
    }

    /// Match one submitted order. Returns `false` when the book reported an
    /// invariant violation, which poisons the engine and ends the worker.
    async fn handle_submit(&mut self, mut order: Order) -> bool {
        let trades = {
            let mut book = self.book.lock().unwrap();
            match book.match_order(&mut order) {
                Ok(trades) => {
                    if order.is_filled() {
                        order.status = OrderStatus::Filled;
                    } else {
                        // a market residual is discarded, never rested
                        order.status = OrderStatus::Partial;
                        if order.kind == OrderType::Limit {
                            book.add_resting(order.clone());
                        }
                    }
                    trades
                }
                Err(err) => {
                    error!(
                        symbol = %self.symbol,
                        order_id = order.id,
                        %err,
                        "book invariant violated, halting engine"
                    );
                    self.poisoned.store(true, Ordering::SeqCst);
                    return false;
                }
            }
        };

        order.update_time = Utc::now();
        self.persist(&order, &trades).await;
        true
    }

    /// The book is the source of truth within the process; boundary failures
    /// are logged and the event stays applied.
    async fn persist(&self, order: &Order, trades: &[Trade]) {
        if let Err(err) = self.backends.orders.update(order).await {
            error!(symbol = %self.symbol, order_id = order.id, %err, "order update failed");
        }
        if trades.is_empty() {
            return;
        }
        if let Err(err) = self.backends.trades.insert_batch(trades).await {
            error!(symbol = %self.symbol, order_id = order.id, %err, "trade batch insert failed");
        }
        if let Err(err) = self.backends.settlement.settle_trades(trades).await {
            error!(symbol = %self.symbol, order_id = order.id, %err, "trade settlement failed");
        }
    }

    async fn handle_cancel(&mut self, order_id: i64) {
        let order = match self.backends.orders.load(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(symbol = %self.symbol, order_id, "cancel for unknown order");
                return;
            }
            Err(err) => {
                error!(symbol = %self.symbol, order_id, %err, "cancel lookup failed");
                return;
            }
        };

        // `false` here means the order filled (or never rested) before the
        // cancel reached the worker; that race is not an error.
        let removed = self.book.lock().unwrap().cancel(order_id, order.side);
        debug!(symbol = %self.symbol, order_id, removed, "cancel processed");

        if let Err(err) = self.backends.settlement.settle_cancel(order_id).await {
            error!(symbol = %self.symbol, order_id, %err, "cancel settlement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{OrderFilter, StoreResult};
    use crate::wallet::NullSettlement;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestOrders {
        rows: Mutex<HashMap<i64, Order>>,
    }

    impl TestOrders {
        fn get(&self, id: i64) -> Option<Order> {
            self.rows.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl OrderStore for TestOrders {
        async fn create(&self, order: &Order) -> StoreResult<i64> {
            self.rows.lock().unwrap().insert(order.id, order.clone());
            Ok(order.id)
        }

        async fn load(&self, order_id: i64) -> StoreResult<Option<Order>> {
            Ok(self.get(order_id))
        }

        async fn list(&self, _filter: &OrderFilter) -> StoreResult<Vec<Order>> {
            Ok(Vec::new())
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
    struct TestTrades {
        rows: Mutex<Vec<Trade>>,
    }

    impl TestTrades {
        fn all(&self) -> Vec<Trade> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeStore for TestTrades {
        async fn insert_batch(&self, trades: &[Trade]) -> StoreResult<()> {
            self.rows.lock().unwrap().extend_from_slice(trades);
            Ok(())
        }
    }

    fn test_worker() -> (Worker, Arc<TestOrders>, Arc<TestTrades>) {
        let orders = Arc::new(TestOrders::default());
        let trades = Arc::new(TestTrades::default());
        let (_submit_tx, submit_rx) = mpsc::channel(8);
        let (_cancel_tx, cancel_rx) = mpsc::channel(8);
        let worker = Worker {
            symbol: "BTCUSDT".to_string(),
            book: Arc::new(Mutex::new(OrderBook::new())),
            submit_rx,
            cancel_rx,
            stop: CancellationToken::new(),
            backends: Backends {
                orders: orders.clone(),
                trades: trades.clone(),
                settlement: Arc::new(NullSettlement),
            },
            poisoned: Arc::new(AtomicBool::new(false)),
        };
        (worker, orders, trades)
    }

    fn order(id: i64, side: crate::orders::OrderSide, kind: OrderType, price: Decimal, amount: Decimal) -> Order {
        let now = Utc::now();
        Order {
            id,
            user_id: 1,
            symbol: "BTCUSDT".to_string(),
            price,
            amount,
            filled: Decimal::ZERO,
            kind,
            side,
            status: OrderStatus::Init,
            create_time: now,
            update_time: now,
        }
    }

    use crate::orders::OrderSide::{Buy, Sell};

    #[tokio::test]
    async fn limit_with_no_match_rests_as_partial() {
        let (mut worker, orders, trades) = test_worker();
        orders
            .create(&order(1, Buy, OrderType::Limit, dec!(100), dec!(5)))
            .await
            .unwrap();

        assert!(worker
            .handle_submit(order(1, Buy, OrderType::Limit, dec!(100), dec!(5)))
            .await);

        assert_eq!(orders.get(1).unwrap().status, OrderStatus::Partial);
        assert!(trades.all().is_empty());
        let bids = worker.book.lock().unwrap().bids_snapshot();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].remaining(), dec!(5));
    }

    #[tokio::test]
    async fn crossing_limit_fills_and_persists_trades() {
        let (mut worker, orders, trades) = test_worker();
        worker
            .handle_submit(order(1, Buy, OrderType::Limit, dec!(100), dec!(5)))
            .await;

        worker
            .handle_submit(order(2, Sell, OrderType::Limit, dec!(100), dec!(5)))
            .await;

        let taker = orders.get(2).unwrap();
        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(taker.filled, dec!(5));

        let recorded = trades.all();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].taker_order_id, 2);
        assert_eq!(recorded[0].maker_order_id, 1);
        assert_eq!(recorded[0].price, dec!(100));

        assert!(worker.book.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn market_residual_stays_partial_and_never_rests() {
        let (mut worker, orders, _trades) = test_worker();
        worker
            .handle_submit(order(1, Sell, OrderType::Limit, dec!(10), dec!(2)))
            .await;

        worker
            .handle_submit(order(2, Buy, OrderType::Market, Decimal::ZERO, dec!(5)))
            .await;

        let taker = orders.get(2).unwrap();
        assert_eq!(taker.status, OrderStatus::Partial);
        assert_eq!(taker.filled, dec!(2));
        // residual is discarded, nothing rests on either side
        assert!(worker.book.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_removes_resting_order() {
        let (mut worker, orders, _trades) = test_worker();
        worker
            .handle_submit(order(7, Buy, OrderType::Limit, dec!(101), dec!(5)))
            .await;
        orders.update_status(7, OrderStatus::Cancelled).await.unwrap();

        worker.handle_cancel(7).await;

        assert!(worker.book.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_is_ignored() {
        let (mut worker, _orders, _trades) = test_worker();
        worker.handle_cancel(404).await;
        assert!(worker.book.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poisoned_engine_refuses_events() {
        let orders = Arc::new(TestOrders::default());
        let trades = Arc::new(TestTrades::default());
        let engine = MatchingEngine::start(
            "BTCUSDT".to_string(),
            Backends {
                orders,
                trades,
                settlement: Arc::new(NullSettlement),
            },
            8,
        );
        engine.poisoned.store(true, Ordering::SeqCst);

        let err = engine
            .submit(order(1, Buy, OrderType::Limit, dec!(1), dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Poisoned(_)));

        engine.stop().await;
    }

    #[tokio::test]
    async fn stopped_engine_rejects_submissions() {
        let orders = Arc::new(TestOrders::default());
        let trades = Arc::new(TestTrades::default());
        let engine = MatchingEngine::start(
            "BTCUSDT".to_string(),
            Backends {
                orders,
                trades,
                settlement: Arc::new(NullSettlement),
            },
            8,
        );
        engine.stop().await;

        let err = engine
            .submit(order(1, Buy, OrderType::Limit, dec!(1), dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Stopped(_)));
    }
}
