//! A single build request and its lifecycle status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Branch used when a submission does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Lifecycle status of a build.
///
/// `Queued -> Running -> Success | Failed`. Terminal states accept no
/// further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Queued, BuildStatus::Running)
                | (BuildStatus::Running, BuildStatus::Success)
                | (BuildStatus::Running, BuildStatus::Failed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition_to(self, next: BuildStatus) -> Result<BuildStatus, BuildError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BuildError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(BuildStatus::Queued),
            "running" => Ok(BuildStatus::Running),
            "success" => Ok(BuildStatus::Success),
            "failed" => Ok(BuildStatus::Failed),
            other => Err(format!("unknown build status: {other}")),
        }
    }
}

/// A persisted build record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub project_name: String,
    pub git_url: String,
    pub branch: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated build that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBuild {
    pub project_name: String,
    pub git_url: String,
    pub branch: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewBuild {
    /// Attach the id assigned by the store.
    pub fn into_build(self, id: i64) -> Build {
        Build {
            id,
            project_name: self.project_name,
            git_url: self.git_url,
            branch: self.branch,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Caller-supplied build submission, before validation.
///
/// Missing fields deserialize as empty so they are reported as validation
/// failures rather than body decoding errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitBuild {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub git_url: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl SubmitBuild {
    /// Validate the submission and stamp it as a fresh `queued` build.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewBuild, BuildError> {
        if self.project_name.trim().is_empty() || self.git_url.trim().is_empty() {
            return Err(BuildError::Validation(
                "project_name and git_url are required".to_string(),
            ));
        }

        let branch = match self.branch {
            Some(branch) if !branch.trim().is_empty() => branch,
            _ => DEFAULT_BRANCH.to_string(),
        };

        Ok(NewBuild {
            project_name: self.project_name,
            git_url: self.git_url,
            branch,
            status: BuildStatus::Queued,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(project: &str, url: &str, branch: Option<&str>) -> SubmitBuild {
        SubmitBuild {
            project_name: project.to_string(),
            git_url: url.to_string(),
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn lifecycle_allows_only_forward_edges() {
        use BuildStatus::*;

        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Success));
        assert!(!Queued.can_transition_to(Queued));
        assert!(!Running.can_transition_to(Queued));
        for terminal in [Success, Failed] {
            assert!(terminal.is_terminal());
            for next in [Queued, Running, Success, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn terminal_reentry_is_rejected() {
        let err = BuildStatus::Success
            .transition_to(BuildStatus::Running)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidTransition {
                from: BuildStatus::Success,
                to: BuildStatus::Running
            }
        ));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            BuildStatus::Queued,
            BuildStatus::Running,
            BuildStatus::Success,
            BuildStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<BuildStatus>().unwrap(), status);
        }
        assert!("pending".parse::<BuildStatus>().is_err());
    }

    #[test]
    fn validate_defaults_branch_and_stamps_timestamps() {
        let now = Utc::now();
        let build = submission("demo", "https://x/y.git", None)
            .validate(now)
            .unwrap();

        assert_eq!(build.branch, DEFAULT_BRANCH);
        assert_eq!(build.status, BuildStatus::Queued);
        assert_eq!(build.created_at, now);
        assert_eq!(build.updated_at, build.created_at);

        let build = submission("demo", "https://x/y.git", Some(""))
            .validate(now)
            .unwrap();
        assert_eq!(build.branch, DEFAULT_BRANCH);

        let build = submission("demo", "https://x/y.git", Some("release"))
            .validate(now)
            .unwrap();
        assert_eq!(build.branch, "release");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let now = Utc::now();
        for (project, url) in [("", "https://x/y.git"), ("demo", ""), ("  ", "u"), ("", "")] {
            let err = submission(project, url, None).validate(now).unwrap_err();
            assert!(matches!(err, BuildError::Validation(_)));
        }
    }

    #[test]
    fn missing_json_fields_deserialize_as_empty() {
        let req: SubmitBuild = serde_json::from_str(r#"{"git_url": "u"}"#).unwrap();
        assert!(req.project_name.is_empty());
        assert!(req.branch.is_none());
    }
}
