use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::engine::{Backends, MatchingEngine};

/// Process-wide map from symbol to its matching engine.
///
/// Engines are created lazily on first use and only torn down through
/// [`close_all`](EngineRegistry::close_all) at shutdown. Reads share the
/// lock; creation re-checks under the write lock so concurrent first
/// submitters race to exactly one engine.
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<MatchingEngine>>>,
    backends: Backends,
    queue_capacity: usize,
}

impl EngineRegistry {
    pub fn new(backends: Backends, queue_capacity: usize) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            backends,
            queue_capacity,
        }
    }

    /// Return the engine for `symbol`, creating and starting it on first use.
    pub async fn get(&self, symbol: &str) -> Arc<MatchingEngine> {
        if let Some(engine) = self.engines.read().await.get(symbol) {
            return engine.clone();
        }

        let mut engines = self.engines.write().await;
        // re-check: another caller may have created it while we waited
        if let Some(engine) = engines.get(symbol) {
            return engine.clone();
        }
        let engine = MatchingEngine::start(
            symbol.to_string(),
            self.backends.clone(),
            self.queue_capacity,
        );
        engines.insert(symbol.to_string(), engine.clone());
        engine
    }

    /// Look up an engine without creating one.
    pub async fn find(&self, symbol: &str) -> Option<Arc<MatchingEngine>> {
        self.engines.read().await.get(symbol).cloned()
    }

    /// Stop every engine and wait for its worker to exit. Calling this twice
    /// is harmless.
    pub async fn close_all(&self) {
        let mut engines = self.engines.write().await;
        for engine in engines.values() {
            engine.stop().await;
        }
        let stopped = engines.len();
        engines.clear();
        if stopped > 0 {
            info!(engines = stopped, "all matching engines stopped");
        }
    }
}
