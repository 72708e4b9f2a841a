//! Persistence port for build records.
//!
//! The lifecycle core only talks to [`BuildStore`]. Implementations must be
//! safe to share between request handlers and background build tasks
//! without external locking.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::build::{Build, BuildStatus, NewBuild};

pub use memory::InMemoryBuildStore;
pub use postgres::PgBuildStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the id.
    #[error("build {0} not found")]
    NotFound(i64),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Persist a new build and return it with its assigned id.
    async fn create(&self, build: NewBuild) -> Result<Build, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Build, StoreError>;

    /// Most recent builds first, at most `limit` records.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Build>, StoreError>;

    /// Overwrite the status and updated timestamp of an existing build.
    async fn update_status(
        &self,
        id: i64,
        status: BuildStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Liveness check against the backing store.
    async fn ping(&self) -> Result<(), StoreError>;
}
