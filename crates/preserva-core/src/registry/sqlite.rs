// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed status registry.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::JobError;

use super::{
    DepositRecord, DepositState, DepositStatusStore, JobRecord, JobStatusStore, NewDeposit,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed deposit and job status registry.
#[derive(Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    /// Create a registry from an existing pool. Migrations must have run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a registry from a database file path.
    ///
    /// Creates parent directories and the database file as needed, connects
    /// with sensible defaults, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                JobError::repository(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| {
                JobError::repository(
                    "connect",
                    format!("Failed to connect to SQLite at {:?}: {}", path, e),
                )
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| JobError::repository("migrate", e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create and initialize a registry from a SQLite connection URL
    /// (`sqlite:path/to.db?mode=rwc` or `sqlite::memory:`), running all
    /// migrations.
    pub async fn from_url(url: &str) -> Result<Self, JobError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| {
                JobError::repository(
                    "connect",
                    format!("Failed to connect to SQLite at {}: {}", url, e),
                )
            })?;
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| JobError::repository("migrate", e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create an in-memory registry for tests and embedded use.
    pub async fn in_memory() -> Result<Self, JobError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| JobError::repository("connect", e.to_string()))?;
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| JobError::repository("migrate", e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl DepositStatusStore for SqliteStatusStore {
    async fn register_deposit(
        &self,
        deposit_id: &str,
        params: &NewDeposit,
    ) -> Result<(), JobError> {
        sqlx::query(
            r#"
            INSERT INTO deposits (deposit_id, state, destination, destination_type, depositor, permission_groups)
            VALUES (?, 'queued', ?, ?, ?, ?)
            ON CONFLICT(deposit_id) DO NOTHING
            "#,
        )
        .bind(deposit_id)
        .bind(&params.destination)
        .bind(&params.destination_type)
        .bind(&params.depositor)
        .bind(&params.permission_groups)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_deposit(&self, deposit_id: &str) -> Result<Option<DepositRecord>, JobError> {
        let record = sqlx::query_as::<_, DepositRecord>(
            r#"
            SELECT deposit_id, state, destination, destination_type, depositor,
                   permission_groups, error, created_at, updated_at
            FROM deposits
            WHERE deposit_id = ?
            "#,
        )
        .bind(deposit_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn state(&self, deposit_id: &str) -> Result<Option<DepositState>, JobError> {
        let state: Option<(String,)> =
            sqlx::query_as("SELECT state FROM deposits WHERE deposit_id = ?")
                .bind(deposit_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(state.and_then(|(s,)| DepositState::parse(&s)))
    }

    async fn set_state(&self, deposit_id: &str, state: DepositState) -> Result<(), JobError> {
        sqlx::query(
            r#"
            UPDATE deposits
            SET state = ?, updated_at = CURRENT_TIMESTAMP
            WHERE deposit_id = ?
            "#,
        )
        .bind(state.as_str())
        .bind(deposit_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_error(&self, deposit_id: &str, error: &str) -> Result<(), JobError> {
        sqlx::query(
            r#"
            UPDATE deposits
            SET error = ?, updated_at = CURRENT_TIMESTAMP
            WHERE deposit_id = ?
            "#,
        )
        .bind(error)
        .bind(deposit_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStatusStore for SqliteStatusStore {
    async fn register_job(
        &self,
        job_id: &str,
        deposit_id: &str,
        name: &str,
    ) -> Result<(), JobError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, deposit_id, name)
            VALUES (?, ?, ?)
            ON CONFLICT(job_id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(deposit_id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, JobError> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT job_id, deposit_id, name, total_completion, incr_completion,
                   started_at, finished_at
            FROM jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_total_completion(&self, job_id: &str, total: i64) -> Result<(), JobError> {
        sqlx::query("UPDATE jobs SET total_completion = ? WHERE job_id = ?")
            .bind(total)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn incr_completion(&self, job_id: &str, delta: i64) -> Result<(), JobError> {
        // The guard keeps incr_completion from ever exceeding the total set
        // at job start.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET incr_completion = incr_completion + ?
            WHERE job_id = ? AND incr_completion + ? <= total_completion
            "#,
        )
        .bind(delta)
        .bind(job_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::repository(
                "incr_completion",
                format!(
                    "completion increment of {} for job '{}' would exceed total",
                    delta, job_id
                ),
            ));
        }

        Ok(())
    }

    async fn object_is_completed(
        &self,
        job_id: &str,
        object_id: &str,
    ) -> Result<bool, JobError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM completed_objects WHERE job_id = ? AND object_id = ?",
        )
        .bind(job_id)
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_object_completed(
        &self,
        job_id: &str,
        object_id: &str,
    ) -> Result<(), JobError> {
        sqlx::query(
            r#"
            INSERT INTO completed_objects (job_id, object_id)
            VALUES (?, ?)
            ON CONFLICT(job_id, object_id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(object_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn completed_count(&self, job_id: &str) -> Result<i64, JobError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM completed_objects WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn finish_job(&self, job_id: &str) -> Result<(), JobError> {
        sqlx::query("UPDATE jobs SET finished_at = CURRENT_TIMESTAMP WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
