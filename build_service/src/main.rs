//! Build Service binary.
//!
//! Accepts build submissions over HTTP, persists them to PostgreSQL (or
//! process memory with `--in-memory`), and runs each build's lifecycle in
//! a background task. Exposes health and Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use build_service::config::ServiceConfig;
use build_service::metrics::PrometheusMetrics;
use build_service::routes::{self, RouterState};
use build_service::services::step_executor::SimulatedBuild;
use build_service::shutdown::{self, ShutdownConfig};
use build_service::store::{BuildStore, InMemoryBuildStore, PgBuildStore};
use build_service::BuildService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let config = ServiceConfig::parse();

    tracing::info!("Starting build service...");

    let store: Arc<dyn BuildStore> = if config.in_memory {
        tracing::warn!("Using in-memory build store; builds are lost on restart");
        Arc::new(InMemoryBuildStore::new())
    } else {
        let store = PgBuildStore::connect(&config.database_url, config.max_connections)?;
        store.migrate().await?;
        Arc::new(store)
    };

    let metrics = Arc::new(PrometheusMetrics::new()?);

    let service = BuildService::new(store, metrics)
        .with_step(Arc::new(SimulatedBuild::new(
            config.build_base_delay(),
            config.build_jitter(),
        )))
        .with_max_concurrent_builds(config.max_concurrent_builds);

    if config.max_concurrent_builds == 0 {
        tracing::info!("Build fan-out is unbounded");
    } else {
        tracing::info!(
            max_concurrent = config.max_concurrent_builds,
            "Build worker pool enabled"
        );
    }

    let app = routes::app(
        RouterState {
            service: service.clone(),
            max_list_limit: config.max_list_limit(),
        },
        config.request_timeout(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Build service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let report = shutdown::serve_until(
        listener,
        app,
        service.runner(),
        ShutdownConfig {
            http_deadline: config.shutdown_timeout(),
            build_drain: config.build_drain(),
        },
        shutdown::shutdown_signal(),
    )
    .await?;

    tracing::info!(outstanding_builds = report.outstanding, "Shutdown complete");
    Ok(())
}
