//! Build submission, queries, and health reporting.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::BuildError;
use crate::metrics::BuildMetrics;
use crate::models::build::{Build, BuildStatus, SubmitBuild};
use crate::services::executor::BuildRunner;
use crate::services::step_executor::{BuildStep, OutcomePolicy};
use crate::store::BuildStore;

/// Result of a liveness check against the store.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BuildService {
    store: Arc<dyn BuildStore>,
    metrics: Arc<dyn BuildMetrics>,
    runner: BuildRunner,
}

impl BuildService {
    pub fn new(store: Arc<dyn BuildStore>, metrics: Arc<dyn BuildMetrics>) -> Self {
        let runner = BuildRunner::new(store.clone(), metrics.clone());
        Self {
            store,
            metrics,
            runner,
        }
    }

    pub fn with_step(mut self, step: Arc<dyn BuildStep>) -> Self {
        self.runner = self.runner.with_step(step);
        self
    }

    pub fn with_outcome(mut self, outcome: Arc<dyn OutcomePolicy>) -> Self {
        self.runner = self.runner.with_outcome(outcome);
        self
    }

    pub fn with_max_concurrent_builds(mut self, max: usize) -> Self {
        self.runner = self.runner.with_max_concurrent_builds(max);
        self
    }

    pub fn runner(&self) -> &BuildRunner {
        &self.runner
    }

    pub fn metrics(&self) -> &Arc<dyn BuildMetrics> {
        &self.metrics
    }

    /// Validate and persist a submission, then start its build task.
    ///
    /// Returns the record as created (status `queued`). The build task runs
    /// detached; this never waits on it.
    ///
    /// The task is spawned here, before the handler writes its response, so
    /// a client that disconnects or a request that hits the timeout still
    /// leaves a created record whose build runs to completion.
    pub async fn submit(&self, request: SubmitBuild) -> Result<Build, BuildError> {
        let new_build = request.validate(Utc::now())?;

        let build = self.store.create(new_build).await.map_err(|e| {
            tracing::error!("Error creating build: {e}");
            BuildError::from(e)
        })?;

        self.metrics.build_status_changed(BuildStatus::Queued);
        self.metrics.active_builds_increment();
        tracing::info!(
            build_id = build.id,
            project = %build.project_name,
            branch = %build.branch,
            "Build created"
        );

        self.runner.spawn(build.clone());
        Ok(build)
    }

    pub async fn get_build(&self, id: i64) -> Result<Build, BuildError> {
        self.store.get_by_id(id).await.map_err(|e| {
            let err = BuildError::from(e);
            if let BuildError::Internal(e) = &err {
                tracing::error!(build_id = id, "Error getting build: {e:#}");
            }
            err
        })
    }

    /// Most recent builds first, at most `limit`.
    pub async fn list_builds(&self, limit: usize) -> Result<Vec<Build>, BuildError> {
        self.store.list_recent(limit).await.map_err(|e| {
            tracing::error!("Error listing builds: {e}");
            BuildError::from(e)
        })
    }

    /// Ping the store and publish the result to the health gauge.
    pub async fn health(&self) -> HealthReport {
        let healthy = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Health check failed: {e}");
                false
            }
        };
        self.metrics.health_status(healthy);

        HealthReport {
            healthy,
            checked_at: Utc::now(),
        }
    }
}
