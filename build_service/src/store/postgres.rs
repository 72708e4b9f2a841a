//! Postgres build store backed by a deadpool-managed diesel-async pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{BuildStore, StoreError};
use crate::models::build::{Build, BuildStatus, NewBuild};
use crate::schema::builds;

pub type DieselPool = Pool<AsyncPgConnection>;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = builds)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BuildRow {
    id: i64,
    project_name: String,
    git_url: String,
    branch: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BuildRow> for Build {
    type Error = StoreError;

    fn try_from(row: BuildRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BuildStatus>()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("build {}: {e}", row.id)))?;

        Ok(Build {
            id: row.id,
            project_name: row.project_name,
            git_url: row.git_url,
            branch: row.branch,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = builds)]
struct NewBuildRow<'a> {
    project_name: &'a str,
    git_url: &'a str,
    branch: &'a str,
    status: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a NewBuild> for NewBuildRow<'a> {
    fn from(build: &'a NewBuild) -> Self {
        Self {
            project_name: &build.project_name,
            git_url: &build.git_url,
            branch: &build.branch,
            status: build.status.as_str(),
            created_at: build.created_at,
            updated_at: build.updated_at,
        }
    }
}

fn query_error(e: diesel::result::Error) -> StoreError {
    StoreError::Backend(e.into())
}

pub struct PgBuildStore {
    pool: DieselPool,
}

impl PgBuildStore {
    /// Build a connection pool. Connections are opened lazily.
    pub fn connect(database_url: &str, max_connections: usize) -> anyhow::Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager).max_size(max_connections).build()?;
        Ok(Self { pool })
    }

    /// Create the `builds` table if needed.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
        tracing::info!("Running build service migration...");
        crate::migration::run_migration(&mut conn).await?;
        tracing::info!("Build service migration completed.");
        Ok(())
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("diesel pool: {e}")))
    }
}

#[async_trait]
impl BuildStore for PgBuildStore {
    async fn create(&self, build: NewBuild) -> Result<Build, StoreError> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(builds::table)
            .values(NewBuildRow::from(&build))
            .get_result::<BuildRow>(&mut *conn)
            .await
            .map_err(query_error)?;
        row.try_into()
    }

    async fn get_by_id(&self, id: i64) -> Result<Build, StoreError> {
        let mut conn = self.conn().await?;
        let row = builds::table
            .find(id)
            .first::<BuildRow>(&mut *conn)
            .await
            .optional()
            .map_err(query_error)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Build>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = builds::table
            .order((builds::created_at.desc(), builds::id.desc()))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .load::<BuildRow>(&mut *conn)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(Build::try_from).collect()
    }

    async fn update_status(
        &self,
        id: i64,
        status: BuildStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(builds::table.find(id))
            .set((
                builds::status.eq(status.as_str()),
                builds::updated_at.eq(updated_at),
            ))
            .execute(&mut *conn)
            .await
            .map_err(query_error)?;

        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::sql_query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}
