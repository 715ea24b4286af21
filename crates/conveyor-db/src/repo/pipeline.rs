//! Pipeline and job records.

use async_trait::async_trait;
use conveyor_core::versions::{BuildInputVersion, BuildOutput, ResourceVersion};
use conveyor_core::{
    BuildId, BuildInput, InputMapping, Job, JobId, Pipeline, ResourceId, Version, VersionId,
    VersionsDb,
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::{DbError, DbResult};

/// A job row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: i64,
    pub name: String,
    pub paused: bool,
}

impl Job for JobRecord {
    fn id(&self) -> JobId {
        JobId::new(self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn paused(&self) -> bool {
        self.paused
    }
}

/// A pipeline backed by PostgreSQL.
pub struct PgPipeline {
    pool: PgPool,
    id: i64,
    name: String,
}

type VersionRow = (i64, i64, i64);
type BuildOutputRow = (i64, i64, i64, i64, i64);
type BuildInputRow = (i64, i64, i64, i64, i64, String);
type NextInputRow = (String, bool, i64, String, String, Json<Version>);

impl PgPipeline {
    /// Load a pipeline by name.
    pub async fn load(pool: &PgPool, name: &str) -> DbResult<Self> {
        let id: i64 = sqlx::query_scalar("SELECT id FROM pipelines WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", name)))?;
        Ok(Self {
            pool: pool.clone(),
            id,
            name: name.to_string(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    async fn job_id(&self, tx: &mut Transaction<'_, Postgres>, job_name: &str) -> DbResult<i64> {
        sqlx::query_scalar("SELECT id FROM jobs WHERE pipeline_id = $1 AND name = $2")
            .bind(self.id)
            .bind(job_name)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}/{}", self.name, job_name)))
    }

    async fn paused(&self) -> DbResult<bool> {
        sqlx::query_scalar("SELECT paused FROM pipelines WHERE id = $1")
            .bind(self.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", self.name)))
    }

    async fn find_job(&self, name: &str) -> DbResult<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>(
            "SELECT id, name, paused FROM jobs WHERE pipeline_id = $1 AND name = $2",
        )
        .bind(self.id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn find_next_build_inputs(&self, job_name: &str) -> DbResult<Option<Vec<BuildInput>>> {
        let determined: bool = sqlx::query_scalar(
            "SELECT inputs_determined FROM jobs WHERE pipeline_id = $1 AND name = $2",
        )
        .bind(self.id)
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}/{}", self.name, job_name)))?;

        if !determined {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, NextInputRow>(
            r#"
            SELECT i.input_name, i.first_occurrence, v.id, r.name, v.type, v.version
            FROM next_build_inputs i
            JOIN jobs j ON j.id = i.job_id
            JOIN versioned_resources v ON v.id = i.version_id
            JOIN resources r ON r.id = v.resource_id
            WHERE j.pipeline_id = $1 AND j.name = $2
            ORDER BY i.input_name
            "#,
        )
        .bind(self.id)
        .bind(job_name)
        .fetch_all(&self.pool)
        .await?;

        let inputs = rows
            .into_iter()
            .map(
                |(name, first_occurrence, version_id, resource, resource_type, version)| {
                    BuildInput {
                        name,
                        version_id: VersionId::new(version_id),
                        resource,
                        resource_type,
                        version: version.0,
                        first_occurrence,
                    }
                },
            )
            .collect();
        Ok(Some(inputs))
    }

    /// Read the whole version history in one read-only snapshot.
    async fn read_versions_db(&self) -> DbResult<VersionsDb> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let versions = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT v.id, r.id, v.check_order
            FROM versioned_resources v
            JOIN resources r ON r.id = v.resource_id
            WHERE r.pipeline_id = $1 AND v.enabled
            "#,
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        let outputs = sqlx::query_as::<_, BuildOutputRow>(
            r#"
            SELECT v.id, r.id, v.check_order, b.id, b.job_id
            FROM build_outputs o
            JOIN builds b ON b.id = o.build_id
            JOIN versioned_resources v ON v.id = o.versioned_resource_id
            JOIN resources r ON r.id = v.resource_id
            WHERE b.pipeline_id = $1 AND b.job_id IS NOT NULL AND v.enabled
            "#,
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        let inputs = sqlx::query_as::<_, BuildInputRow>(
            r#"
            SELECT v.id, r.id, v.check_order, b.id, b.job_id, i.name
            FROM build_inputs i
            JOIN builds b ON b.id = i.build_id
            JOIN versioned_resources v ON v.id = i.versioned_resource_id
            JOIN resources r ON r.id = v.resource_id
            WHERE b.pipeline_id = $1 AND b.job_id IS NOT NULL AND v.enabled
            "#,
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        let job_ids = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, id FROM jobs WHERE pipeline_id = $1",
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        let resource_ids = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, id FROM resources WHERE pipeline_id = $1",
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let resource_version = |version_id, resource_id, check_order| ResourceVersion {
            version_id: VersionId::new(version_id),
            resource_id: ResourceId::new(resource_id),
            check_order,
        };

        Ok(VersionsDb {
            resource_versions: versions
                .into_iter()
                .map(|(v, r, order)| resource_version(v, r, order))
                .collect(),
            build_outputs: outputs
                .into_iter()
                .map(|(v, r, order, build, job)| BuildOutput {
                    resource_version: resource_version(v, r, order),
                    build_id: BuildId::new(build),
                    job_id: JobId::new(job),
                })
                .collect(),
            build_inputs: inputs
                .into_iter()
                .map(|(v, r, order, build, job, input_name)| BuildInputVersion {
                    resource_version: resource_version(v, r, order),
                    build_id: BuildId::new(build),
                    job_id: JobId::new(job),
                    input_name,
                })
                .collect(),
            job_ids: job_ids
                .into_iter()
                .map(|(name, id)| (name, JobId::new(id)))
                .collect(),
            resource_ids: resource_ids
                .into_iter()
                .map(|(name, id)| (name, ResourceId::new(id)))
                .collect(),
        })
    }

    async fn replace_next_inputs(&self, job_name: &str, mapping: &InputMapping) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let job_id = self.job_id(&mut tx, job_name).await?;

        sqlx::query("UPDATE jobs SET inputs_determined = true WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM next_build_inputs WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        for (input_name, input) in mapping {
            sqlx::query(
                r#"
                INSERT INTO next_build_inputs (job_id, input_name, version_id, first_occurrence)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(job_id)
            .bind(input_name)
            .bind(input.version_id.get())
            .bind(input.first_occurrence)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_next_inputs(&self, job_name: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let job_id = self.job_id(&mut tx, job_name).await?;

        sqlx::query("UPDATE jobs SET inputs_determined = false WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM next_build_inputs WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn builds_in_serial_groups(
        &self,
        job_name: &str,
        serial_groups: &[String],
        condition: &str,
    ) -> DbResult<Vec<i64>> {
        let query = format!(
            r#"
            SELECT DISTINCT b.id
            FROM builds b
            JOIN jobs j ON j.id = b.job_id
            LEFT JOIN jobs_serial_groups g ON g.job_id = j.id
            WHERE j.pipeline_id = $1
              AND (j.name = $2 OR g.serial_group = ANY($3))
              AND {}
            ORDER BY b.id ASC
            "#,
            condition
        );
        let ids = sqlx::query_scalar::<_, i64>(&query)
            .bind(self.id)
            .bind(job_name)
            .bind(serial_groups)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn update_max_in_flight_reached(&self, job_name: &str, reached: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET max_in_flight_reached = $3 WHERE pipeline_id = $1 AND name = $2",
        )
        .bind(self.id)
        .bind(job_name)
        .bind(reached)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("job {}/{}", self.name, job_name)));
        }
        Ok(())
    }
}

#[async_trait]
impl Pipeline for PgPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_paused(&self) -> conveyor_core::Result<bool> {
        Ok(self.paused().await?)
    }

    async fn job(&self, name: &str) -> conveyor_core::Result<Option<Arc<dyn Job>>> {
        let job = self.find_job(name).await?;
        Ok(job.map(|j| Arc::new(j) as Arc<dyn Job>))
    }

    async fn next_build_inputs(
        &self,
        job_name: &str,
    ) -> conveyor_core::Result<Option<Vec<BuildInput>>> {
        Ok(self.find_next_build_inputs(job_name).await?)
    }

    async fn load_versions_db(&self) -> conveyor_core::Result<VersionsDb> {
        Ok(self.read_versions_db().await?)
    }

    async fn save_next_input_mapping(
        &self,
        job_name: &str,
        mapping: &InputMapping,
    ) -> conveyor_core::Result<()> {
        Ok(self.replace_next_inputs(job_name, mapping).await?)
    }

    async fn delete_next_input_mapping(&self, job_name: &str) -> conveyor_core::Result<()> {
        Ok(self.clear_next_inputs(job_name).await?)
    }

    async fn running_builds_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> conveyor_core::Result<Vec<BuildId>> {
        let ids = self
            .builds_in_serial_groups(job_name, serial_groups, "b.scheduled AND NOT b.completed")
            .await?;
        Ok(ids.into_iter().map(BuildId::new).collect())
    }

    async fn next_pending_build_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> conveyor_core::Result<Option<BuildId>> {
        let ids = self
            .builds_in_serial_groups(
                job_name,
                serial_groups,
                "b.status = 'pending' AND NOT b.scheduled",
            )
            .await?;
        Ok(ids.into_iter().next().map(BuildId::new))
    }

    async fn set_max_in_flight_reached(
        &self,
        job_name: &str,
        reached: bool,
    ) -> conveyor_core::Result<()> {
        Ok(self.update_max_in_flight_reached(job_name, reached).await?)
    }
}
