use std::sync::Arc;

use sqlx::PgPool;

use crate::engine::Backends;
use crate::registry::EngineRegistry;
use crate::store::{OrderStore, PgOrderStore, PgTradeStore};
use crate::wallet::NullSettlement;

/// Shared application state.
///
/// Holds the engine registry (which owns every per-symbol worker) and the
/// order store the ingress reads and writes directly.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EngineRegistry>,
    pub orders: Arc<dyn OrderStore>,
}

impl AppState {
    /// Wire the production state onto a Postgres pool.
    pub fn postgres(pool: PgPool, queue_capacity: usize) -> Self {
        let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool.clone()));
        let backends = Backends {
            orders: orders.clone(),
            trades: Arc::new(PgTradeStore::new(pool)),
            settlement: Arc::new(NullSettlement),
        };
        Self {
            registry: Arc::new(EngineRegistry::new(backends, queue_capacity)),
            orders,
        }
    }

    /// Assemble state from explicit boundary implementations; used by tests
    /// to run without a database.
    pub fn with_backends(backends: Backends, queue_capacity: usize) -> Self {
        let orders = backends.orders.clone();
        Self {
            registry: Arc::new(EngineRegistry::new(backends, queue_capacity)),
            orders,
        }
    }
}
