//! In-memory build store.
//!
//! Used by `--in-memory` deployments and by tests. Outages can be simulated
//! with [`InMemoryBuildStore::fail_pings`] and
//! [`InMemoryBuildStore::fail_updates`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{BuildStore, StoreError};
use crate::models::build::{Build, BuildStatus, NewBuild};

#[derive(Default)]
struct Inner {
    next_id: i64,
    builds: HashMap<i64, Build>,
    history: HashMap<i64, Vec<BuildStatus>>,
}

#[derive(Default)]
pub struct InMemoryBuildStore {
    inner: Mutex<Inner>,
    fail_pings: AtomicBool,
    fail_updates: AtomicBool,
    create_calls: AtomicUsize,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` report the store as unreachable.
    pub fn fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Make `update_status` fail for every build.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of `create` calls received, successful or not.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Every status ever stored for a build, oldest first.
    pub fn status_history(&self, id: i64) -> Vec<BuildStatus> {
        self.lock().history.get(&id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave `Inner` half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn create(&self, build: NewBuild) -> Result<Build, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let build = build.into_build(id);
        inner.history.insert(id, vec![build.status]);
        inner.builds.insert(id, build.clone());
        Ok(build)
    }

    async fn get_by_id(&self, id: i64) -> Result<Build, StoreError> {
        self.lock()
            .builds
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Build>, StoreError> {
        let mut builds: Vec<Build> = self.lock().builds.values().cloned().collect();
        builds.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        builds.truncate(limit);
        Ok(builds)
    }

    async fn update_status(
        &self,
        id: i64,
        status: BuildStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }

        let mut inner = self.lock();
        let build = inner.builds.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        build.status = status;
        build.updated_at = updated_at;
        inner.history.entry(id).or_default().push(status);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_pings.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated ping failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_build(project: &str, created_at: DateTime<Utc>) -> NewBuild {
        NewBuild {
            project_name: project.to_string(),
            git_url: "https://x/y.git".to_string(),
            branch: "main".to_string(),
            status: BuildStatus::Queued,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn create_assigns_unique_ids() {
        let store = InMemoryBuildStore::new();
        let now = Utc::now();
        let a = store.create(new_build("a", now)).await.unwrap();
        let b = store.create(new_build("b", now)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.get_by_id(a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = InMemoryBuildStore::new();
        assert!(matches!(
            store.get_by_id(42).await,
            Err(StoreError::NotFound(42))
        ));
        assert!(matches!(
            store.update_status(42, BuildStatus::Running, Utc::now()).await,
            Err(StoreError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_bounded() {
        let store = InMemoryBuildStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .create(new_build(&format!("p{i}"), base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let recent = store.list_recent(3).await.unwrap();
        let names: Vec<_> = recent.iter().map(|b| b.project_name.as_str()).collect();
        assert_eq!(names, ["p4", "p3", "p2"]);
    }

    #[tokio::test]
    async fn update_records_history() {
        let store = InMemoryBuildStore::new();
        let build = store.create(new_build("a", Utc::now())).await.unwrap();
        let later = build.created_at + Duration::seconds(1);
        store
            .update_status(build.id, BuildStatus::Running, later)
            .await
            .unwrap();

        let stored = store.get_by_id(build.id).await.unwrap();
        assert_eq!(stored.status, BuildStatus::Running);
        assert_eq!(stored.updated_at, later);
        assert_eq!(
            store.status_history(build.id),
            [BuildStatus::Queued, BuildStatus::Running]
        );
    }

    #[tokio::test]
    async fn simulated_failures() {
        let store = InMemoryBuildStore::new();
        let build = store.create(new_build("a", Utc::now())).await.unwrap();

        store.fail_pings(true);
        assert!(store.ping().await.is_err());
        store.fail_pings(false);
        assert!(store.ping().await.is_ok());

        store.fail_updates(true);
        assert!(store
            .update_status(build.id, BuildStatus::Running, Utc::now())
            .await
            .is_err());
        assert_eq!(store.status_history(build.id), [BuildStatus::Queued]);
    }
}
