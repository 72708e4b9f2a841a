//! Shutdown coordination between HTTP serving and build tasks.
//!
//! On the shutdown signal the listener stops accepting connections and
//! in-flight requests get `http_deadline` to finish; after that the server
//! future is aborted. Build tasks are then handled by the configured
//! [`BuildDrain`] policy. With `Detach` they keep running against a store
//! that may already be closing, so their terminal status is best-effort.

use std::future::Future;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::services::executor::{BuildDrain, BuildRunner, DrainReport};

#[derive(Debug, Clone, Copy)]
pub struct ShutdownConfig {
    pub http_deadline: Duration,
    pub build_drain: BuildDrain,
}

/// Serve `app` until `signal` resolves, then drain.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    runner: &BuildRunner,
    config: ShutdownConfig,
    signal: F,
) -> anyhow::Result<DrainReport>
where
    F: Future<Output = ()> + Send,
{
    let token = CancellationToken::new();
    let graceful = token.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            tracing::warn!("HTTP server exited without a shutdown signal");
        }
        _ = signal => {
            token.cancel();
            tracing::info!(
                deadline_secs = config.http_deadline.as_secs_f64(),
                "Draining in-flight requests"
            );
            match tokio::time::timeout(config.http_deadline, &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    tracing::warn!("Shutdown deadline elapsed, dropping open connections");
                    server.abort();
                }
            }
        }
    }

    Ok(runner.drain(config.build_drain).await)
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
