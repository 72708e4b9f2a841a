//! JSON shapes for the build API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::build_service::HealthReport;

pub const SERVICE_NAME: &str = "build-service";

#[derive(Debug, Deserialize)]
pub struct ListBuildsQuery {
    pub limit: Option<i64>,
}

impl ListBuildsQuery {
    /// Requested limit clamped to `1..=max`; absent means `max`.
    pub fn effective_limit(&self, max: usize) -> usize {
        match self.limit {
            Some(limit) => usize::try_from(limit.max(1)).unwrap_or(max).min(max),
            None => max,
        }
    }
}

/// Health endpoint body.
#[derive(Debug, Serialize)]
pub struct HealthJson {
    pub status: &'static str,
    pub database: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl From<&HealthReport> for HealthJson {
    fn from(report: &HealthReport) -> Self {
        let (status, database) = if report.healthy {
            ("healthy", "connected")
        } else {
            ("unhealthy", "disconnected")
        };

        Self {
            status,
            database,
            service: SERVICE_NAME,
            timestamp: report.checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let q = |limit| ListBuildsQuery { limit };
        assert_eq!(q(None).effective_limit(100), 100);
        assert_eq!(q(Some(10)).effective_limit(100), 10);
        assert_eq!(q(Some(500)).effective_limit(100), 100);
        assert_eq!(q(Some(0)).effective_limit(100), 1);
        assert_eq!(q(Some(-3)).effective_limit(100), 1);
    }

    #[test]
    fn unhealthy_report_shape() {
        let json = HealthJson::from(&HealthReport {
            healthy: false,
            checked_at: Utc::now(),
        });
        assert_eq!(json.status, "unhealthy");
        assert_eq!(json.database, "disconnected");
        assert_eq!(json.service, SERVICE_NAME);
    }
}
