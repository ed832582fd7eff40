use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::orders::{Order, OrderSide, OrderStatus, OrderType};
use crate::trade::Trade;

/// Book-level failures. An overfilled resting order can only come from state
/// corruption; the owning engine treats it as fatal and stops accepting
/// events for the symbol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("resting order {0} is overfilled")]
    Overfill(i64),
}

/// Composite key for ask levels: the best ask is the smallest `(price, seq)`.
type AskKey = (Decimal, u64);

/// Composite key for bid levels: wrapping the price in [`Reverse`] makes the
/// smallest key the highest price, with ties still broken by earliest `seq`.
type BidKey = (Reverse<Decimal>, u64);

/// An [`OrderBook`] holds the **resting** limit orders of one symbol in two
/// ordered indexes:
/// - `bids` (buy orders), best = highest price;
/// - `asks` (sell orders), best = lowest price.
///
/// Both indexes are keyed by `(price, seq)` where `seq` is a strictly
/// increasing per-book counter assigned when an order first rests. Equal
/// prices therefore match in FIFO arrival order (**price-time** priority).
/// A side lookup map gives O(log n) cancellation by order id.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<BidKey, Order>,
    asks: BTreeMap<AskKey, Order>,
    /// id -> (side, price, seq); enough to rebuild either composite key.
    index: HashMap<i64, (OrderSide, Decimal, u64)>,
    next_seq: u64,
}

/// Matches an incoming taker against one side of the book, consuming resting
/// makers in best-first order and producing the fill list.
///
/// Both order indexes sort their best key first, so the walk is a plain
/// `first_entry` loop for either side. For each maker:
/// - limit takers stop at the first maker whose price no longer crosses;
/// - the fill is `min(taker remaining, maker remaining)`, exact decimal
///   arithmetic with no rounding;
/// - the trade price is the maker's resting price;
/// - a fully filled maker is removed from the index before moving on.
fn match_against<K: Ord + Copy>(
    levels: &mut BTreeMap<K, Order>,
    index: &mut HashMap<i64, (OrderSide, Decimal, u64)>,
    taker: &mut Order,
) -> Result<Vec<Trade>, BookError> {
    let mut trades = Vec::new();
    let mut remaining = taker.remaining();

    while remaining > Decimal::ZERO {
        let Some(mut entry) = levels.first_entry() else {
            break;
        };
        let maker = entry.get_mut();

        if taker.kind == OrderType::Limit {
            let crosses = match taker.side {
                OrderSide::Buy => taker.price >= maker.price,
                OrderSide::Sell => taker.price <= maker.price,
            };
            if !crosses {
                break;
            }
        }

        let available = maker.remaining();
        if available <= Decimal::ZERO {
            return Err(BookError::Overfill(maker.id));
        }

        let fill = remaining.min(available);
        trades.push(Trade {
            id: 0,
            taker_order_id: taker.id,
            maker_order_id: maker.id,
            price: maker.price,
            amount: fill,
            timestamp: Utc::now(),
        });

        maker.filled += fill;
        taker.filled += fill;
        remaining -= fill;

        if maker.is_filled() {
            maker.status = OrderStatus::Filled;
            let done = entry.remove();
            index.remove(&done.id);
        }
    }

    Ok(trades)
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a limit order in the side-appropriate index and records it in
    /// the lookup map, assigning the next book-wide `seq`.
    ///
    /// Callers must pass a limit order with `filled < amount` whose id is not
    /// already resting; anything else is a programming error.
    pub fn add_resting(&mut self, order: Order) {
        debug_assert_eq!(order.kind, OrderType::Limit);
        debug_assert!(order.filled < order.amount);
        debug_assert!(matches!(
            order.status,
            OrderStatus::Init | OrderStatus::Partial
        ));
        debug_assert!(
            !self.index.contains_key(&order.id),
            "order {} already resting",
            order.id
        );

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(order.id, (order.side, order.price, seq));
        match order.side {
            OrderSide::Buy => {
                self.bids.insert((Reverse(order.price), seq), order);
            }
            OrderSide::Sell => {
                self.asks.insert((order.price, seq), order);
            }
        }
    }

    /// Removes a resting order. Returns `false` for an unknown id or a side
    /// mismatch; both are no-ops so a cancel racing a fill stays harmless.
    pub fn cancel(&mut self, order_id: i64, side: OrderSide) -> bool {
        let Some(&(resting_side, price, seq)) = self.index.get(&order_id) else {
            return false;
        };
        if resting_side != side {
            return false;
        }
        let removed = match side {
            OrderSide::Buy => self.bids.remove(&(Reverse(price), seq)).is_some(),
            OrderSide::Sell => self.asks.remove(&(price, seq)).is_some(),
        };
        if removed {
            self.index.remove(&order_id);
        }
        removed
    }

    /// Matches `taker` against the opposite side, mutating `taker.filled` in
    /// place and returning the fills in the order they happened. The taker is
    /// **not** added to the book here; the engine decides whether it rests.
    pub fn match_order(&mut self, taker: &mut Order) -> Result<Vec<Trade>, BookError> {
        if taker.remaining() <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        match taker.side {
            OrderSide::Buy => match_against(&mut self.asks, &mut self.index, taker),
            OrderSide::Sell => match_against(&mut self.bids, &mut self.index, taker),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|&(Reverse(price), _)| price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().map(|&(price, _)| price)
    }

    /// Point-in-time copy of the resting bids, best (highest) price first.
    pub fn bids_snapshot(&self) -> Vec<Order> {
        self.bids.values().cloned().collect()
    }

    /// Point-in-time copy of the resting asks, best (lowest) price first.
    pub fn asks_snapshot(&self) -> Vec<Order> {
        self.asks.values().cloned().collect()
    }

    /// Number of resting orders across both sides.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
