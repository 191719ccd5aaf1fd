//! Request metrics capture.
//!
//! Observes every request and its response - counts, per-status counts, and
//! cumulative processing time - without altering response bytes or headers.
//! Updates the process-local atomic counters and mirrors the same events to
//! the Prometheus facade.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::metrics::{self, RequestMetrics};

/// Metrics capture layer.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Metrics capture service wrapper.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S> Service<Request<Body>> for MetricsService<S>
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
        let counters = self.metrics.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start = Instant::now();
            counters.record_request_received();
            metrics::record_request_received();

            let response = inner.call(req).await?;

            let elapsed = start.elapsed();
            let status = response.status().as_u16();
            counters.record_response(status, elapsed.as_micros() as u64);
            metrics::record_response(status, elapsed.as_secs_f64());

            Ok(response)
        })
    }
}
