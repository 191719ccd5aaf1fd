//! Per-client request admission with bounded memory.
//!
//! # Ledger
//!
//! One token bucket per client identity, held in a sharded concurrent map.
//! A bucket starts full at the configured burst capacity and refills
//! continuously at the configured rate; every request consumes one token and
//! refreshes the entry's last-seen stamp. Denial is a normal control-flow
//! outcome that the tower layer turns into a 429 - it never propagates as an
//! error.
//!
//! # Eviction
//!
//! A sweep task wakes once a minute and removes entries idle for more than
//! three minutes, bounding memory. The sweep runs on the lifecycle
//! supervisor, so it is tracked and stops at shutdown. A burst of many
//! distinct never-returning clients inside one sweep window causes a
//! transient memory bump; that is an accepted tradeoff.
//!
//! # Locking
//!
//! Map shard locks are held only for the lookup/insert/evict itself, never
//! across I/O. Request handling never removes entries; only the sweep does.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use tokio::time::interval;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

use crate::error::AppError;
use crate::lifecycle::TaskSupervisor;
use crate::middleware::ip::{TrustedProxyConfig, client_identity};

/// How often the sweep task wakes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Idle time after which a ledger entry is evicted.
pub const IDLE_EVICTION_THRESHOLD: Duration = Duration::from_secs(180);

/// A continuously refilling token reservoir capped at the burst capacity.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
        }
    }

    /// Refill for the elapsed time, then try to take one token.
    fn try_consume(&mut self, rps: f64, burst: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(f64::from(burst));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// The per-client admission ledger.
///
/// At most one entry exists per client identity; entries are created lazily
/// on first sight and destroyed only by [`ClientLedger::sweep`].
#[derive(Debug)]
pub struct ClientLedger {
    entries: DashMap<String, ClientEntry>,
    rps: f64,
    burst: u32,
}

impl ClientLedger {
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            entries: DashMap::new(),
            rps,
            burst,
        }
    }

    /// Admit or deny one request from `client_id`.
    pub fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now())
    }

    fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        let mut entry = self
            .entries
            .entry(client_id.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::full(self.burst, now),
                last_seen: now,
            });

        entry.last_seen = now;
        entry.bucket.try_consume(self.rps, self.burst, now)
    }

    /// Evict entries idle for longer than [`IDLE_EVICTION_THRESHOLD`].
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= IDLE_EVICTION_THRESHOLD;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rate limiting layer for the tower middleware stack.
///
/// When rate limiting is disabled by configuration this layer is simply not
/// attached, so the ledger is bypassed entirely and every request is
/// admitted.
#[derive(Clone)]
pub struct RateLimitLayer {
    ledger: Arc<ClientLedger>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(rps: f64, burst: u32, trusted_proxies: &[String]) -> Self {
        Self {
            ledger: Arc::new(ClientLedger::new(rps, burst)),
            trusted_proxies: Arc::new(TrustedProxyConfig::new(trusted_proxies)),
        }
    }

    /// Start the periodic eviction sweep on the lifecycle supervisor.
    ///
    /// The task is tracked like any other background work and exits when
    /// shutdown begins, so it cannot leak past process teardown.
    pub fn spawn_sweeper(&self, supervisor: &TaskSupervisor) {
        let ledger = self.ledger.clone();
        let cancel = supervisor.shutdown_token();

        supervisor.spawn(async move {
            let mut ticker = interval(SWEEP_INTERVAL);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("ledger sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = ledger.sweep();
                        trace!(evicted, remaining = ledger.len(), "rate ledger swept");
                    }
                }
            }
        });
    }

    /// The ledger behind this layer, for introspection.
    pub fn ledger(&self) -> Arc<ClientLedger> {
        self.ledger.clone()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            ledger: self.ledger.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    ledger: Arc<ClientLedger>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let ledger = self.ledger.clone();
        let trusted_proxies = self.trusted_proxies.clone();
        let mut inner = self.inner.clone();

        let client_id = client_identity(&req, &trusted_proxies).into_owned();

        Box::pin(async move {
            if ledger.admit(&client_id) {
                inner.call(req).await
            } else {
                warn!(
                    client = %client_id,
                    path = %req.uri().path(),
                    "rate limit exceeded"
                );

                let mut response = AppError::RateLimited.into_response();
                response.headers_mut().insert(
                    "Retry-After",
                    axum::http::HeaderValue::from_static("1"),
                );
                Ok(response)
            }
        })
    }
}
