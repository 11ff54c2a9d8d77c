//! SQLite Job Repository
//!
//! 状态迁移一律是带条件的 UPDATE（`WHERE status IN (...)`），并发修改不会越过状态机。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use super::database::{db_err, parse_time, parse_uuid};
use super::DbPool;
use crate::application::ports::{JobFailure, JobRecord, JobRepositoryPort, RepositoryError};
use crate::domain::retail_sample::SampleMode;
use crate::domain::{DetectionMode, JobStatus, Phase};

/// SQLite Job Repository
pub struct SqliteJobRepository {
    pool: DbPool,
}

impl SqliteJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id, title, author, narrator, voice_id, status, manuscript_key, detection_mode, sample_mode, \
     segment_count, track_count, manifest_key, failure_classification, failure_reference, failure_guidance, \
     failure_message, failure_phase, failure_segment_id, created_at, updated_at, completed_at";

#[derive(FromRow)]
struct JobRow {
    id: String,
    title: String,
    author: Option<String>,
    narrator: Option<String>,
    voice_id: String,
    status: String,
    manuscript_key: String,
    detection_mode: String,
    sample_mode: String,
    segment_count: i64,
    track_count: i64,
    manifest_key: Option<String>,
    failure_classification: Option<String>,
    failure_reference: Option<String>,
    failure_guidance: Option<String>,
    failure_message: Option<String>,
    failure_phase: Option<String>,
    failure_segment_id: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let failure = match (row.failure_classification, row.failure_reference) {
            (Some(classification), Some(reference)) => Some(JobFailure {
                classification,
                reference,
                guidance: row.failure_guidance.unwrap_or_default(),
                message: row.failure_message.unwrap_or_default(),
                phase: row
                    .failure_phase
                    .as_deref()
                    .and_then(Phase::from_str)
                    .unwrap_or(Phase::Synthesis),
                segment_id: row.failure_segment_id.as_deref().map(parse_uuid).transpose()?,
            }),
            _ => None,
        };

        Ok(JobRecord {
            id: parse_uuid(&row.id)?,
            title: row.title,
            author: row.author,
            narrator: row.narrator,
            voice_id: row.voice_id,
            status: JobStatus::from_str(&row.status).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown job status {}", row.status))
            })?,
            manuscript_key: row.manuscript_key,
            detection_mode: DetectionMode::from_str(&row.detection_mode).unwrap_or_default(),
            sample_mode: SampleMode::from_str(&row.sample_mode).unwrap_or_default(),
            segment_count: row.segment_count as u32,
            track_count: row.track_count as u32,
            manifest_key: row.manifest_key,
            failure,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
            completed_at: row.completed_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

/// `?, ?, ?` 占位符
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl JobRepositoryPort for SqliteJobRepository {
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, title, author, narrator, voice_id, status, manuscript_key,
                              detection_mode, sample_mode, segment_count, track_count,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.title)
        .bind(&job.author)
        .bind(&job.narrator)
        .bind(&job.voice_id)
        .bind(job.status.as_str())
        .bind(&job.manuscript_key)
        .bind(job.detection_mode.as_str())
        .bind(job.sample_mode.as_str())
        .bind(job.segment_count as i64)
        .bind(job.track_count as i64)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, RepositoryError> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(db_err)?;
        let applied = result.rows_affected() == 1;
        if applied {
            tracing::debug!(job_id = %id, to = %to, "Job status changed");
        }
        Ok(applied)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        from: &[JobStatus],
        failure: &JobFailure,
    ) -> Result<bool, RepositoryError> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            UPDATE jobs SET status = 'failed', updated_at = ?,
                failure_classification = ?, failure_reference = ?, failure_guidance = ?,
                failure_message = ?, failure_phase = ?, failure_segment_id = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(&failure.classification)
            .bind(&failure.reference)
            .bind(&failure.guidance)
            .bind(&failure.message)
            .bind(failure.phase.as_str())
            .bind(failure.segment_id.map(|s| s.to_string()))
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        manifest_key: &str,
        track_count: u32,
    ) -> Result<bool, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'completed', manifest_key = ?, track_count = ?,
                updated_at = ?, completed_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(manifest_key)
        .bind(track_count as i64)
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'pending', updated_at = ?,
                failure_classification = NULL, failure_reference = NULL, failure_guidance = NULL,
                failure_message = NULL, failure_phase = NULL, failure_segment_id = NULL
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_segment_count(&self, id: Uuid, count: u32) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE jobs SET segment_count = ?, updated_at = ? WHERE id = ?")
            .bind(count as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}
