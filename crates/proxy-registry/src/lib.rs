//! Backend Registry (C1): stores backends keyed by id, serves ordered
//! snapshots to the router, and records per-request outcomes.

use futures::future::join_all;
use proxy_common::config::RegistryConfig;
use proxy_common::error::{Error, Result};
use proxy_common::types::{Backend, BackendId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Append-only store of backends with a stable registration order.
///
/// Registry owns the backends; callers hold `Arc` references and never
/// free them directly. Registration order is preserved in `list()` so
/// routing decisions stay reproducible across runs (invariant 1, 3.3).
pub struct Registry {
    backends: RwLock<Vec<Arc<dyn Backend>>>,
    index: RwLock<HashMap<BackendId, usize>>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a new backend. Fails if the id is already present; identity
    /// is never rewritten once registered.
    pub fn register(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let id = backend.config().id.clone();
        let mut index = self.index.write();
        if index.contains_key(&id) {
            return Err(Error::Fatal(format!("backend id already registered: {id}")));
        }
        let mut backends = self.backends.write();
        index.insert(id.clone(), backends.len());
        backends.push(backend);
        debug!(backend_id = %id, "registered backend");
        Ok(())
    }

    /// Ordered snapshot of every registered backend, in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Backend>> {
        self.backends.read().clone()
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Backend>> {
        let index = self.index.read();
        let backends = self.backends.read();
        index.get(id).map(|&i| backends[i].clone())
    }

    /// Record the outcome of one request against a backend. Safe to call
    /// concurrently from many forwarding attempts.
    pub fn record_outcome(&self, id: &str, latency_ms: u64, ok: bool) -> Result<()> {
        let backend = self
            .lookup(id)
            .ok_or_else(|| Error::Fatal(format!("record_outcome: unknown backend {id}")))?;
        backend.update_metrics(latency_ms, ok);
        Ok(())
    }

    /// Probe every backend's health concurrently, each bounded by
    /// `config.health_check_timeout`. A failing probe flips `healthy=false`
    /// immediately; a subsequent success flips it back. No hysteresis is
    /// applied at this layer. Returns only the backends whose health flag
    /// actually changed, for callers (the core) that announce transitions.
    pub async fn health_check_all(&self) -> Vec<(BackendId, bool)> {
        let backends = self.list();
        let timeout = self.config.health_check_timeout;
        let checks = backends.into_iter().map(|backend| async move {
            let id = backend.config().id.clone();
            let was_healthy = backend.healthy();
            let outcome = tokio::time::timeout(timeout, backend.health_check()).await;
            let healthy = matches!(outcome, Ok(Ok(())));
            if !healthy {
                warn!(backend_id = %id, "health check failed, marking unhealthy");
            }
            backend.set_healthy(healthy);
            (id, was_healthy, healthy)
        });
        join_all(checks)
            .await
            .into_iter()
            .filter(|(_, was, now)| was != now)
            .map(|(id, _, healthy)| (id, healthy))
            .collect()
    }

    /// Spawn a background ticker that calls `health_check_all` on the
    /// configured interval. The returned handle must be awaited (or
    /// aborted) to join the worker cleanly. A standalone convenience for
    /// embedders that want health checks running without wiring up
    /// `proxy-core`'s signal bus; `ProxyCore` drives its own ticker instead
    /// so it can publish `BackendStatusChanged` for each flip.
    pub fn start_health_check_loop(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.health_check_all().await;
            }
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig {
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        })
    }
}
