//! Build records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{Build, BuildId, BuildInput, BuildStatus, JobId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::{DbError, DbResult};

/// A build row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BuildRecord {
    pub id: i64,
    pub name: String,
    pub job_id: Option<i64>,
    pub pipeline_id: Option<i64>,
    pub status: String,
    pub scheduled: bool,
    pub completed: bool,
    pub manually_triggered: bool,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A build backed by PostgreSQL.
///
/// Holds the row as it was when loaded; lifecycle operations go straight to
/// the database and do not refresh it.
pub struct PgBuild {
    pool: PgPool,
    record: BuildRecord,
}

impl PgBuild {
    pub fn new(pool: PgPool, record: BuildRecord) -> Self {
        Self { pool, record }
    }

    pub async fn get(pool: &PgPool, id: BuildId) -> DbResult<Self> {
        let record = sqlx::query_as::<_, BuildRecord>("SELECT * FROM builds WHERE id = $1")
            .bind(id.get())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        Ok(Self::new(pool.clone(), record))
    }

    /// Pending builds of a job, oldest first.
    pub async fn pending_for_job(pool: &PgPool, job_id: JobId) -> DbResult<Vec<Self>> {
        let records = sqlx::query_as::<_, BuildRecord>(
            "SELECT * FROM builds WHERE job_id = $1 AND status = 'pending' ORDER BY id ASC",
        )
        .bind(job_id.get())
        .fetch_all(pool)
        .await?;
        Ok(records
            .into_iter()
            .map(|record| Self::new(pool.clone(), record))
            .collect())
    }

    /// Create a pending build for a job, named from the job's build counter.
    ///
    /// Bumping the counter locks the job row, so concurrent creations for the
    /// same job get distinct names.
    pub async fn create_pending(
        pool: &PgPool,
        job_id: JobId,
        manually_triggered: bool,
    ) -> DbResult<Self> {
        let record = sqlx::query_as::<_, BuildRecord>(
            r#"
            WITH next AS (
                UPDATE jobs SET build_number_seq = build_number_seq + 1
                WHERE id = $1
                RETURNING id, pipeline_id, build_number_seq
            )
            INSERT INTO builds (name, job_id, pipeline_id, status, manually_triggered)
            SELECT next.build_number_seq::text, next.id, next.pipeline_id, 'pending', $2
            FROM next
            RETURNING *
            "#,
        )
        .bind(job_id.get())
        .bind(manually_triggered)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", job_id)))?;
        Ok(Self::new(pool.clone(), record))
    }

    /// Create a pending build outside of any pipeline, named from the
    /// `one_off_name` sequence.
    pub async fn create_one_off(pool: &PgPool) -> DbResult<Self> {
        let record = sqlx::query_as::<_, BuildRecord>(
            r#"
            INSERT INTO builds (name, status, manually_triggered)
            VALUES (nextval('one_off_name')::text, 'pending', true)
            RETURNING *
            "#,
        )
        .fetch_one(pool)
        .await?;
        Ok(Self::new(pool.clone(), record))
    }

    pub fn record(&self) -> &BuildRecord {
        &self.record
    }

    pub fn status(&self) -> DbResult<BuildStatus> {
        self.record
            .status
            .parse()
            .map_err(|_| DbError::InvalidData(format!("build status {}", self.record.status)))
    }

    async fn try_schedule(&self) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE builds SET scheduled = true WHERE id = $1 AND status = 'pending' AND NOT scheduled",
        )
        .bind(self.record.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_inputs(&self, inputs: &[BuildInput]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM build_inputs WHERE build_id = $1")
            .bind(self.record.id)
            .execute(&mut *tx)
            .await?;

        for input in inputs {
            sqlx::query(
                "INSERT INTO build_inputs (build_id, versioned_resource_id, name) VALUES ($1, $2, $3)",
            )
            .bind(self.record.id)
            .bind(input.version_id.get())
            .bind(&input.name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_finished(&self, status: BuildStatus) -> DbResult<()> {
        if !status.is_terminal() {
            return Err(DbError::InvalidData(format!(
                "cannot finish build {} as {}",
                self.record.id, status
            )));
        }

        let result = sqlx::query(
            "UPDATE builds SET status = $2, completed = true, end_time = NOW() WHERE id = $1",
        )
        .bind(self.record.id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("build {}", self.record.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Build for PgBuild {
    fn id(&self) -> BuildId {
        BuildId::new(self.record.id)
    }

    fn is_manually_triggered(&self) -> bool {
        self.record.manually_triggered
    }

    async fn schedule(&self) -> conveyor_core::Result<bool> {
        let scheduled = self.try_schedule().await?;
        debug!(build_id = self.record.id, scheduled, "Schedule claim");
        Ok(scheduled)
    }

    async fn use_inputs(&self, inputs: &[BuildInput]) -> conveyor_core::Result<()> {
        Ok(self.replace_inputs(inputs).await?)
    }

    async fn finish(&self, status: BuildStatus) -> conveyor_core::Result<()> {
        Ok(self.mark_finished(status).await?)
    }
}
