//! The cross-cutting request pipeline.
//!
//! Composition order is fixed in `routes.rs`, outermost first:
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Panic Recovery   │ ← 500 + Connection: close on any unwind
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← preflights short-circuit here
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Metrics Capture  │ ← counters + processing time
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Bearer Auth     │ ← resolves Identity once per request
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Gates (route)   │ ← ordered Authenticated/Activated/Permission checks
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```

pub mod auth;
pub mod gates;
pub mod ip;
pub mod metrics;
pub mod panics;
pub mod rate_limit;

pub use auth::BearerAuthLayer;
pub use gates::RequireLayer;
pub use ip::{TrustedProxyConfig, UNKNOWN_CLIENT, client_identity};
pub use metrics::MetricsLayer;
pub use panics::PanicRecoveryLayer;
pub use rate_limit::{ClientLedger, IDLE_EVICTION_THRESHOLD, RateLimitLayer, SWEEP_INTERVAL};
