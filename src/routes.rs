//! Application routing and middleware composition.
//!
//! The pipeline wraps every route in a fixed order, outermost first: panic
//! recovery, rate limiting, CORS, metrics capture, identity resolution.
//! Authorization gates are attached per route, innermost, so they see the
//! identity the resolution layer attached.
//!
//! Axum applies `.layer()` bottom-to-top: the last layer added runs first.

use std::time::Duration;

use axum::Router;
use axum::handler::Handler;
use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppError;
use crate::handlers;
use crate::middleware::{
    BearerAuthLayer, MetricsLayer, PanicRecoveryLayer, RateLimitLayer, RequireLayer,
};
use crate::state::AppState;

/// How long browsers may cache a preflight response.
const CORS_MAX_AGE: Duration = Duration::from_secs(15);

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let read = RequireLayer::permission("movies:read");
    let write = RequireLayer::permission("movies:write");

    // =========================================================================
    // Routes (gates applied per route, innermost)
    // =========================================================================
    let mut router = Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route(
            "/v1/movies",
            get(handlers::list_movies.layer(read.clone()))
                .post(handlers::create_movie.layer(write.clone())),
        )
        .route(
            "/v1/movies/{id}",
            get(handlers::show_movie.layer(read))
                .patch(handlers::update_movie.layer(write.clone()))
                .delete(handlers::delete_movie.layer(write)),
        )
        .route("/v1/users", post(handlers::register_user))
        .route("/v1/users/activated", put(handlers::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        )
        .route(
            "/v1/tokens/activation",
            post(handlers::resend_activation_token),
        )
        .route("/debug/vars", get(handlers::debug_vars))
        .fallback(not_found);

    // =========================================================================
    // Middleware (applied bottom-to-top; listed here inner to outer)
    // =========================================================================

    // 5. Identity resolution - attaches the request's Identity
    router = router.layer(BearerAuthLayer::new(state.store.clone()));

    // 4. Metrics capture
    router = router.layer(MetricsLayer::new(state.metrics.clone()));

    // 3. CORS negotiation against the trusted origin list
    router = router.layer(build_cors_layer(&config.cors_trusted_origins));

    // HTTP request/response logging
    router = router.layer(TraceLayer::new_for_http());

    // 2. Rate limiting (when enabled) with its supervised sweep task
    if config.rate_limiting_enabled() {
        info!(
            rps = config.rate_limit_rps,
            burst = config.rate_limit_burst,
            trusted_proxies = config.trusted_proxies.len(),
            "rate limiting enabled"
        );
        let rate_limit = RateLimitLayer::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
            &config.trusted_proxies,
        );
        rate_limit.spawn_sweeper(&state.tasks);
        router = router.layer(rate_limit);
    } else {
        info!("rate limiting disabled (RATE_LIMIT_ENABLED=false)");
    }

    // 1. Panic recovery, outermost: nothing unwinds past this
    router = router.layer(PanicRecoveryLayer::new());

    router.with_state(state)
}

/// Enveloped 404 for unmatched paths.
async fn not_found() -> axum::response::Response {
    AppError::NotFound.into_response()
}

/// Build the CORS layer from the trusted origin list.
///
/// Preflight responses advertise the mutating methods plus the headers the
/// API actually reads, and may be cached briefly.
fn build_cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::OPTIONS,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(CORS_MAX_AGE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cors_layer_with_origins() {
        let origins = vec![
            "https://app.marquee.example".to_string(),
            "https://admin.marquee.example".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_skips_unparseable_origins() {
        let origins = vec!["https://ok.example".to_string(), "\u{0}bad".to_string()];
        let _layer = build_cors_layer(&origins);
    }
}
