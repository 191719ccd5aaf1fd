//! Per-route authorization gates.
//!
//! A route's guard is an explicit ordered list of [`Gate`]s evaluated in
//! sequence against the identity resolved earlier in the pipeline. Ordering
//! and short-circuiting live in data, not in nested closures, so the chain
//! is directly testable.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use crate::error::AppError;
use crate::models::identity::{Gate, Identity, check_gates};

/// Authorization layer applied per route.
///
/// Constructors encode the nesting invariant - permission implies activated
/// implies authenticated - by always prefixing the weaker gates.
#[derive(Clone)]
pub struct RequireLayer {
    gates: Arc<[Gate]>,
}

impl RequireLayer {
    /// Require a non-anonymous identity.
    pub fn authenticated() -> Self {
        Self {
            gates: Arc::from([Gate::Authenticated]),
        }
    }

    /// Require an activated account.
    pub fn activated() -> Self {
        Self {
            gates: Arc::from([Gate::Authenticated, Gate::Activated]),
        }
    }

    /// Require an activated account holding the given capability code.
    pub fn permission(code: &str) -> Self {
        Self {
            gates: Arc::from([
                Gate::Authenticated,
                Gate::Activated,
                Gate::Permission(code.to_string()),
            ]),
        }
    }

    /// The gate chain, in evaluation order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }
}

impl<S> Layer<S> for RequireLayer {
    type Service = RequireService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireService {
            inner,
            gates: self.gates.clone(),
        }
    }
}

/// Authorization service wrapper.
#[derive(Clone)]
pub struct RequireService<S> {
    inner: S,
    gates: Arc<[Gate]>,
}

impl<S> Service<Request<Body>> for RequireService<S>
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
        let gates = self.gates.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // The identity was attached by the resolution middleware; its
            // absence means the pipeline was miswired.
            let verdict = match req.extensions().get::<Identity>() {
                Some(identity) => check_gates(&gates, identity),
                None => Err(AppError::Internal(
                    "no identity attached to request".to_string(),
                )),
            };

            if let Err(err) = verdict {
                return Ok(err.into_response());
            }

            inner.call(req).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_layer_builds_the_full_chain_in_order() {
        let layer = RequireLayer::permission("movies:read");
        let gates = layer.gates();

        assert_eq!(gates.len(), 3);
        assert!(matches!(gates[0], Gate::Authenticated));
        assert!(matches!(gates[1], Gate::Activated));
        assert!(matches!(&gates[2], Gate::Permission(code) if code == "movies:read"));
    }

    #[test]
    fn test_activated_layer_prefixes_authenticated() {
        let layer = RequireLayer::activated();
        let gates = layer.gates();

        assert_eq!(gates.len(), 2);
        assert!(matches!(gates[0], Gate::Authenticated));
        assert!(matches!(gates[1], Gate::Activated));
    }

    #[test]
    fn test_authenticated_layer_is_a_single_gate() {
        assert_eq!(RequireLayer::authenticated().gates().len(), 1);
    }
}
