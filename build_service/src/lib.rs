//! Build Service: accepts build requests over HTTP and drives each one
//! through `queued -> running -> success|failed` in a background task.
//!
//! The lifecycle core ([`services`]) depends only on a persistence port
//! ([`store::BuildStore`]) and a metrics sink ([`metrics::BuildMetrics`]),
//! both injected at construction time.

pub mod config;
pub mod error;
pub mod metrics;
pub mod migration;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod shutdown;
pub mod store;

pub use error::BuildError;
pub use models::build::{Build, BuildStatus, SubmitBuild};
pub use services::build_service::BuildService;
