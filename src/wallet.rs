//! Settlement boundary toward the wallet/balance subsystem.
//!
//! Frozen-funds accounting lives outside this service; the engine only hands
//! over trade batches and cancel outcomes through [`Settlement`].

use async_trait::async_trait;
use tracing::debug;

use crate::store::StoreResult;
use crate::trade::Trade;

#[async_trait]
pub trait Settlement: Send + Sync {
    /// Apply the funds movement for a batch of fills.
    async fn settle_trades(&self, trades: &[Trade]) -> StoreResult<()>;

    /// Release funds frozen for a cancelled order.
    async fn settle_cancel(&self, order_id: i64) -> StoreResult<()>;
}

/// Settlement stub for deployments without a wallet subsystem.
pub struct NullSettlement;

#[async_trait]
impl Settlement for NullSettlement {
    async fn settle_trades(&self, trades: &[Trade]) -> StoreResult<()> {
        debug!(count = trades.len(), "settlement disabled, trade batch skipped");
        Ok(())
    }

    async fn settle_cancel(&self, order_id: i64) -> StoreResult<()> {
        debug!(order_id, "settlement disabled, cancel release skipped");
        Ok(())
    }
}
