//! Shared application state for Axum handlers.
//!
//! Cloned per request; every component is either `Arc`-wrapped or internally
//! cheap to clone (the store holds pool handles, the supervisor holds a
//! tracker handle).

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::lifecycle::TaskSupervisor;
use crate::mailer::Mailer;
use crate::metrics::RequestMetrics;
use crate::store::Storage;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer over the shared connection pool
    pub store: Storage,
    /// Outbound mail dispatcher
    pub mailer: Mailer,
    /// Application configuration
    pub config: Arc<Config>,
    /// Process-local request counters
    pub metrics: Arc<RequestMetrics>,
    /// Supervisor for fire-and-forget background work
    pub tasks: TaskSupervisor,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Storage, mailer: Mailer, config: Config) -> Self {
        Self {
            store,
            mailer,
            config: Arc::new(config),
            metrics: Arc::new(RequestMetrics::new()),
            tasks: TaskSupervisor::new(),
            started_at: Instant::now(),
        }
    }

    /// Application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
