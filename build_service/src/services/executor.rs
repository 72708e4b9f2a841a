//! Build executor: one background task per accepted build.
//!
//! Each task drives its build through `queued -> running -> success|failed`.
//! It is the only writer of that build's status after creation. Exit
//! accounting (duration histogram, active-builds gauge) lives in a drop
//! guard so it runs exactly once however the task ends: normal
//! completion, a persistence error, a panic, or the future being dropped.
//!
//! Persistence errors inside a task are logged and swallowed; nobody is
//! waiting on the task, so terminal status is delivered at most once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::error::BuildError;
use crate::metrics::BuildMetrics;
use crate::models::build::{Build, BuildStatus};
use crate::services::step_executor::{BuildStep, OutcomePolicy, ProjectNameLength, SimulatedBuild};
use crate::store::BuildStore;

/// What to do with outstanding build tasks once HTTP serving has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDrain {
    /// Leave tasks running best-effort until the process exits.
    Detach,
    /// Wait up to the given deadline for tasks to finish.
    Wait(Duration),
}

/// Result of draining the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks still running when the drain returned.
    pub outstanding: usize,
}

#[derive(Clone)]
pub struct BuildRunner {
    store: Arc<dyn BuildStore>,
    metrics: Arc<dyn BuildMetrics>,
    step: Arc<dyn BuildStep>,
    outcome: Arc<dyn OutcomePolicy>,
    permits: Option<Arc<Semaphore>>,
    tracker: TaskTracker,
}

impl BuildRunner {
    pub fn new(store: Arc<dyn BuildStore>, metrics: Arc<dyn BuildMetrics>) -> Self {
        Self {
            store,
            metrics,
            step: Arc::new(SimulatedBuild::default()),
            outcome: Arc::new(ProjectNameLength),
            permits: None,
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_step(mut self, step: Arc<dyn BuildStep>) -> Self {
        self.step = step;
        self
    }

    pub fn with_outcome(mut self, outcome: Arc<dyn OutcomePolicy>) -> Self {
        self.outcome = outcome;
        self
    }

    /// Cap the number of builds past `queued` at once. `0` means unbounded.
    pub fn with_max_concurrent_builds(mut self, max: usize) -> Self {
        self.permits = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    /// Number of build tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Detach a task that drives `build` to a terminal status.
    ///
    /// The caller must already have counted the build in the active-builds
    /// gauge; the task's exit guard takes that count back.
    pub fn spawn(&self, build: Build) -> JoinHandle<()> {
        let guard = ExitGuard {
            metrics: self.metrics.clone(),
            project: build.project_name.clone(),
            started: Instant::now(),
        };
        let runner = self.clone();

        self.tracker.spawn(async move {
            let _guard = guard;
            runner.run(build).await;
        })
    }

    async fn run(&self, mut build: Build) {
        let build_id = build.id;

        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::error!(build_id, "Build worker pool closed, abandoning build");
                    return;
                }
            },
            None => None,
        };

        if let Err(e) = self.transition(&mut build, BuildStatus::Running).await {
            tracing::error!(build_id, status = "running", "Error updating build status: {e:#}");
            return;
        }
        tracing::info!(build_id, project = %build.project_name, "Build running");

        self.step.run(&build).await;

        let terminal = BuildStatus::from(self.outcome.decide(&build));
        if let Err(e) = self.transition(&mut build, terminal).await {
            tracing::error!(build_id, status = %terminal, "Error updating build status: {e:#}");
            return;
        }
        self.metrics.build_status_changed(terminal);

        tracing::info!(build_id, status = %terminal, "Build completed");
    }

    /// Validate and persist one lifecycle step for `build`.
    async fn transition(&self, build: &mut Build, next: BuildStatus) -> Result<(), BuildError> {
        let next = build.status.transition_to(next)?;
        let updated_at = Utc::now().max(build.updated_at);

        self.store.update_status(build.id, next, updated_at).await?;

        build.status = next;
        build.updated_at = updated_at;
        Ok(())
    }

    /// Stop tracking new work and apply the drain policy to what remains.
    pub async fn drain(&self, policy: BuildDrain) -> DrainReport {
        self.tracker.close();

        match policy {
            BuildDrain::Detach => {
                let outstanding = self.tracker.len();
                if outstanding > 0 {
                    tracing::warn!(
                        outstanding,
                        "Leaving build tasks detached; terminal status is best-effort"
                    );
                }
                DrainReport { outstanding }
            }
            BuildDrain::Wait(deadline) => {
                tracing::info!(
                    outstanding = self.tracker.len(),
                    deadline_secs = deadline.as_secs_f64(),
                    "Waiting for build tasks to finish"
                );
                if tokio::time::timeout(deadline, self.tracker.wait()).await.is_err() {
                    let outstanding = self.tracker.len();
                    tracing::warn!(outstanding, "Build drain deadline elapsed");
                    return DrainReport { outstanding };
                }
                DrainReport { outstanding: 0 }
            }
        }
    }
}

/// Exit accounting for one build task.
struct ExitGuard {
    metrics: Arc<dyn BuildMetrics>,
    project: String,
    started: Instant,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.metrics
            .build_duration(&self.project, self.started.elapsed());
        self.metrics.active_builds_decrement();
    }
}
