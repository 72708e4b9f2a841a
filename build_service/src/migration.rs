//! Schema bootstrap for the `builds` table.

use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};

/// Idempotent SQL that creates the build tables and indexes.
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS builds (
    id              BIGSERIAL PRIMARY KEY,
    project_name    VARCHAR(255) NOT NULL CHECK (project_name <> ''),
    git_url         VARCHAR(500) NOT NULL CHECK (git_url <> ''),
    branch          VARCHAR(100) NOT NULL DEFAULT 'main',
    status          VARCHAR(50)  NOT NULL DEFAULT 'queued',
    created_at      TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
    CHECK (created_at <= updated_at)
);

CREATE INDEX IF NOT EXISTS idx_builds_status ON builds (status);
CREATE INDEX IF NOT EXISTS idx_builds_project ON builds (project_name);
CREATE INDEX IF NOT EXISTS idx_builds_created_at ON builds (created_at DESC);
"#;

/// Run the build service migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("build migration failed: {e}"))?;
    Ok(())
}
