//! Build metrics sink.
//!
//! The lifecycle core records through [`BuildMetrics`]. The Prometheus sink
//! owns its recorder instead of installing a global one, so every service
//! instance (and every test) gets an isolated registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::models::build::BuildStatus;

pub const BUILDS_TOTAL: &str = "builds_total";
pub const BUILD_DURATION_SECONDS: &str = "build_duration_seconds";
pub const ACTIVE_BUILDS: &str = "active_builds";
pub const HEALTH_STATUS: &str = "health_status";

/// Histogram buckets for build durations, in seconds.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub trait BuildMetrics: Send + Sync {
    /// Count a build entering `status` (`queued` on submission, terminal on completion).
    fn build_status_changed(&self, status: BuildStatus);

    /// Record how long a build task ran.
    fn build_duration(&self, project: &str, elapsed: Duration);

    fn active_builds_increment(&self);

    fn active_builds_decrement(&self);

    fn health_status(&self, healthy: bool);

    /// Text exposition of the current values, if the sink supports scraping.
    fn render(&self) -> Option<String> {
        None
    }
}

/// Prometheus-backed sink.
pub struct PrometheusMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(BUILD_DURATION_SECONDS.to_string()),
                DURATION_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        let sink = Self { recorder, handle };
        sink.record(|| {
            describe_counter!(BUILDS_TOTAL, "Total number of builds processed");
            describe_histogram!(BUILD_DURATION_SECONDS, "Build duration in seconds");
            describe_gauge!(ACTIVE_BUILDS, "Number of currently active builds");
            describe_gauge!(
                HEALTH_STATUS,
                "Health status of the service (1 = healthy, 0 = unhealthy)"
            );
        });
        sink.health_status(true);
        Ok(sink)
    }

    fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }
}

impl BuildMetrics for PrometheusMetrics {
    fn build_status_changed(&self, status: BuildStatus) {
        self.record(|| counter!(BUILDS_TOTAL, "status" => status.as_str()).increment(1));
    }

    fn build_duration(&self, project: &str, elapsed: Duration) {
        self.record(|| {
            histogram!(BUILD_DURATION_SECONDS, "project" => project.to_string())
                .record(elapsed.as_secs_f64())
        });
    }

    fn active_builds_increment(&self) {
        self.record(|| gauge!(ACTIVE_BUILDS).increment(1.0));
    }

    fn active_builds_decrement(&self) {
        self.record(|| gauge!(ACTIVE_BUILDS).decrement(1.0));
    }

    fn health_status(&self, healthy: bool) {
        let value = if healthy { 1.0 } else { 0.0 };
        self.record(|| gauge!(HEALTH_STATUS).set(value));
    }

    fn render(&self) -> Option<String> {
        Some(self.handle.render())
    }
}

/// Sink that keeps values in memory for inspection.
pub struct InMemoryMetrics {
    builds_total: Mutex<HashMap<BuildStatus, u64>>,
    durations: Mutex<Vec<(String, Duration)>>,
    active_builds: AtomicI64,
    health: AtomicI64,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self {
            builds_total: Mutex::new(HashMap::new()),
            durations: Mutex::new(Vec::new()),
            active_builds: AtomicI64::new(0),
            health: AtomicI64::new(1),
        }
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds_total(&self, status: BuildStatus) -> u64 {
        let counts = self.builds_total.lock().unwrap_or_else(|p| p.into_inner());
        counts.get(&status).copied().unwrap_or(0)
    }

    pub fn active_builds(&self) -> i64 {
        self.active_builds.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> i64 {
        self.health.load(Ordering::SeqCst)
    }

    /// Recorded `(project, duration)` observations, in order.
    pub fn durations(&self) -> Vec<(String, Duration)> {
        self.durations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl BuildMetrics for InMemoryMetrics {
    fn build_status_changed(&self, status: BuildStatus) {
        let mut counts = self.builds_total.lock().unwrap_or_else(|p| p.into_inner());
        *counts.entry(status).or_default() += 1;
    }

    fn build_duration(&self, project: &str, elapsed: Duration) {
        self.durations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((project.to_string(), elapsed));
    }

    fn active_builds_increment(&self) {
        self.active_builds.fetch_add(1, Ordering::SeqCst);
    }

    fn active_builds_decrement(&self) {
        self.active_builds.fetch_sub(1, Ordering::SeqCst);
    }

    fn health_status(&self, healthy: bool) {
        self.health.store(i64::from(healthy), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_sink_renders_its_own_registry() {
        let sink = PrometheusMetrics::new().unwrap();
        sink.build_status_changed(BuildStatus::Queued);
        sink.active_builds_increment();
        sink.build_duration("demo", Duration::from_millis(30));

        let text = sink.render().unwrap();
        assert!(text.contains(BUILDS_TOTAL));
        assert!(text.contains(r#"status="queued""#));
        assert!(text.contains(ACTIVE_BUILDS));
        assert!(text.contains(r#"project="demo""#));
        assert!(text.contains(HEALTH_STATUS));
    }

    #[test]
    fn prometheus_sinks_are_isolated() {
        let first = PrometheusMetrics::new().unwrap();
        let second = PrometheusMetrics::new().unwrap();
        first.build_status_changed(BuildStatus::Failed);

        assert!(first.render().unwrap().contains(r#"status="failed""#));
        assert!(!second.render().unwrap().contains(r#"status="failed""#));
    }

    #[test]
    fn in_memory_sink_tracks_values() {
        let sink = InMemoryMetrics::new();
        assert_eq!(sink.health(), 1);

        sink.build_status_changed(BuildStatus::Queued);
        sink.build_status_changed(BuildStatus::Queued);
        sink.active_builds_increment();
        sink.active_builds_increment();
        sink.active_builds_decrement();
        sink.health_status(false);
        sink.build_duration("demo", Duration::from_secs(2));

        assert_eq!(sink.builds_total(BuildStatus::Queued), 2);
        assert_eq!(sink.builds_total(BuildStatus::Success), 0);
        assert_eq!(sink.active_builds(), 1);
        assert_eq!(sink.health(), 0);
        assert_eq!(sink.durations(), [("demo".to_string(), Duration::from_secs(2))]);
        assert!(sink.render().is_none());
    }
}
