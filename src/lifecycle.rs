//! Process lifecycle: background task supervision and graceful shutdown.
//!
//! # Shutdown sequence
//!
//! ```text
//! Running ──signal──▶ ShuttingDown ──tasks empty──▶ Drained ──▶ Stopped
//! ```
//!
//! - **Running**: the server accepts connections; handlers spawn fire-and-
//!   forget work through [`TaskSupervisor::spawn`].
//! - **ShuttingDown**: entered on SIGINT/SIGTERM. The grace deadline (signal
//!   time + 20 s) is recorded immediately, new connections are refused via
//!   axum's cooperative shutdown, and tracked background tasks are awaited
//!   with no per-task timeout (they are assumed short-lived mail/IO work).
//! - **Drained**: the task set is empty; the remaining transport drain is
//!   bounded by whatever is left of the grace deadline.
//! - **Stopped**: the transport drained in time, or the deadline elapsed and
//!   the process exits with [`AppError::ShutdownTimeout`] - the only error
//!   that terminates the program abnormally.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::Router;
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Total time allowed between the termination signal and process exit.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(20);

/// Tracks in-flight background work and owns the shutdown signal that
/// supervised periodic tasks (e.g. the rate ledger sweeper) select on.
#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register one unit of background work.
    ///
    /// The task is counted from registration until completion regardless of
    /// outcome: a panic inside the task is caught and logged, never
    /// propagated, and never aborts the supervisor.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                error!("background task panicked");
            }
        });
    }

    /// Number of currently tracked background tasks.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// The token cancelled when shutdown begins. Periodic tasks select on
    /// this so they are stoppable rather than leaked at exit.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close the tracker and wait for every tracked task to finish.
    pub(crate) async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is a critical
/// initialization failure that should halt the application.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("failed to install Ctrl+C handler: {e}");
                panic!("critical: cannot install Ctrl+C signal handler");
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                panic!("critical: cannot install SIGTERM signal handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Serve the application until a termination signal arrives, then drive the
/// shutdown sequence documented at module level.
pub async fn serve(listener: TcpListener, router: Router, supervisor: TaskSupervisor) -> AppResult<()> {
    serve_with_signal(listener, router, supervisor, shutdown_signal()).await
}

/// [`serve`] with an injectable termination signal, used by tests.
pub async fn serve_with_signal<S>(
    listener: TcpListener,
    router: Router,
    supervisor: TaskSupervisor,
    signal: S,
) -> AppResult<()>
where
    S: Future<Output = ()>,
{
    let shutdown = supervisor.shutdown_token();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let token = shutdown.clone();
        async move { token.cancelled().await }
    })
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            // The transport failed before any signal arrived.
            return result.map_err(|e| AppError::Internal(format!("server error: {e}")));
        }
        () = signal => {}
    }

    // ShuttingDown: the grace deadline starts ticking at the signal, not
    // after the task set drains.
    let deadline = Instant::now() + SHUTDOWN_GRACE_PERIOD;
    shutdown.cancel();

    info!("completing background tasks");
    supervisor.drain().await;

    // Drained. The remaining transport drain gets whatever is left of the
    // grace period; background tasks that overran it already consumed it.
    if Instant::now() >= deadline {
        warn!("background tasks exceeded the shutdown grace period");
        return Err(AppError::ShutdownTimeout);
    }

    info!("draining connections");
    match timeout_at(deadline, &mut server).await {
        Ok(result) => {
            result.map_err(|e| AppError::Internal(format!("server error: {e}")))?;
            info!("stopped server");
            Ok(())
        }
        Err(_) => Err(AppError::ShutdownTimeout),
    }
}
