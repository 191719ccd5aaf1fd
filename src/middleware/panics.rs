//! Panic containment, the outermost pipeline stage.
//!
//! Any unwind escaping an inner stage or handler is caught here and turned
//! into the generic server-error envelope. The response carries
//! `Connection: close` so the client abandons a connection whose state a
//! partial failure may have corrupted. A fault never reaches the transport
//! layer unhandled.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CONNECTION, HeaderValue};
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::error;

use crate::error::AppError;

/// Panic containment layer.
#[derive(Clone, Default)]
pub struct PanicRecoveryLayer;

impl PanicRecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PanicRecoveryLayer {
    type Service = PanicRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicRecoveryService { inner }
    }
}

/// Panic containment service wrapper.
#[derive(Clone)]
pub struct PanicRecoveryService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for PanicRecoveryService<S>
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
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match AssertUnwindSafe(inner.call(req)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    error!(panic = %panic_message(panic.as_ref()), "request handler panicked");

                    let mut response =
                        AppError::Internal("recovered from panic".to_string()).into_response();
                    response
                        .headers_mut()
                        .insert(CONNECTION, HeaderValue::from_static("close"));
                    Ok(response)
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/boom",
                get(|| async {
                    panic!("handler exploded");
                    #[allow(unreachable_code)]
                    ""
                }),
            )
            .layer(PanicRecoveryLayer::new())
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_server_error() {
        let response = app().oneshot(request("/boom")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_normal_requests_pass_through_unmarked() {
        let response = app().oneshot(request("/ok")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONNECTION).is_none());
    }

    #[tokio::test]
    async fn test_service_survives_a_panic() {
        let app = app();

        let first = app.clone().oneshot(request("/boom")).await.unwrap();
        assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The shared service is still usable afterwards.
        let second = app.oneshot(request("/ok")).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }
}
