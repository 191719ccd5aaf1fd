//! # Marquee
//!
//! A movie catalog JSON API built around four interacting control-plane
//! mechanisms:
//!
//! - **Admission**: a per-client token-bucket ledger with idle-entry
//!   eviction bounds both request rate and memory.
//! - **Identity**: bearer tokens resolve once per request into an
//!   `Anonymous | Authenticated` identity; ordered gates authorize routes.
//! - **Lifecycle**: fire-and-forget work (outbound mail, the ledger sweep)
//!   runs on a supervisor that graceful shutdown drains before the process
//!   exits, bounded by a 20 second grace period.
//! - **Optimistic concurrency**: versioned rows are updated with single
//!   conditional writes, so concurrent editors get conflicts instead of
//!   lost updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Panic → Rate Limit → CORS → Metrics → Auth)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Route gates (Authenticated → Activated → Permission)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (healthcheck, movies, users, tokens, debug)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Storage (sqlx/PostgreSQL) · Mailer (lettre/SMTP)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use lifecycle::TaskSupervisor;
pub use mailer::Mailer;
pub use routes::build_router;
pub use state::AppState;
pub use store::Storage;
