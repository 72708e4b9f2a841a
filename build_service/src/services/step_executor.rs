//! Build step and outcome policy.
//!
//! The step stands in for real compilation: it only has to take time. The
//! outcome policy decides the terminal status once the step returns and
//! must be pure so the lifecycle is reproducible in tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::build::{Build, BuildStatus};

/// Terminal result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl From<Outcome> for BuildStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => BuildStatus::Success,
            Outcome::Failed => BuildStatus::Failed,
        }
    }
}

/// The work performed between `running` and the terminal status.
#[async_trait]
pub trait BuildStep: Send + Sync {
    async fn run(&self, build: &Build);
}

/// Placeholder step that waits `base + (len(project_name) % 4) * jitter`.
#[derive(Debug, Clone)]
pub struct SimulatedBuild {
    base: Duration,
    jitter: Duration,
}

impl SimulatedBuild {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn delay_for(&self, build: &Build) -> Duration {
        let spread = (build.project_name.len() % 4) as u32;
        self.base + self.jitter * spread
    }
}

impl Default for SimulatedBuild {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(1))
    }
}

#[async_trait]
impl BuildStep for SimulatedBuild {
    async fn run(&self, build: &Build) {
        let delay = self.delay_for(build);
        tracing::debug!(build_id = build.id, delay_ms = delay.as_millis() as u64, "Simulating build");
        tokio::time::sleep(delay).await;
    }
}

/// Decides whether a finished build succeeded.
pub trait OutcomePolicy: Send + Sync {
    fn decide(&self, build: &Build) -> Outcome;
}

impl<F> OutcomePolicy for F
where
    F: Fn(&Build) -> Outcome + Send + Sync,
{
    fn decide(&self, build: &Build) -> Outcome {
        self(build)
    }
}

/// Fails builds whose project name length is a multiple of ten.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectNameLength;

impl OutcomePolicy for ProjectNameLength {
    fn decide(&self, build: &Build) -> Outcome {
        if build.project_name.len() % 10 == 0 {
            Outcome::Failed
        } else {
            Outcome::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn build(project: &str) -> Build {
        let now = Utc::now();
        Build {
            id: 1,
            project_name: project.to_string(),
            git_url: "https://x/y.git".to_string(),
            branch: "main".to_string(),
            status: BuildStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn project_name_length_policy() {
        assert_eq!(ProjectNameLength.decide(&build("demo")), Outcome::Success);
        assert_eq!(ProjectNameLength.decide(&build("abcdefghij")), Outcome::Failed);
        assert_eq!(ProjectNameLength.decide(&build("abcdefghijk")), Outcome::Success);
    }

    #[test]
    fn closures_are_policies() {
        let always_fail = |_: &Build| Outcome::Failed;
        assert_eq!(always_fail.decide(&build("demo")), Outcome::Failed);
    }

    #[test]
    fn simulated_delay_spreads_by_name_length() {
        let step = SimulatedBuild::default();
        assert_eq!(step.delay_for(&build("demo")), Duration::from_secs(2));
        assert_eq!(step.delay_for(&build("demo1")), Duration::from_secs(3));
        assert_eq!(step.delay_for(&build("abcdefg")), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_step_sleeps_for_its_delay() {
        let step = SimulatedBuild::new(Duration::from_secs(2), Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        step.run(&build("demo1")).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(BuildStatus::from(Outcome::Success), BuildStatus::Success);
        assert_eq!(BuildStatus::from(Outcome::Failed), BuildStatus::Failed);
        assert!(BuildStatus::from(Outcome::Failed).is_terminal());
    }
}
