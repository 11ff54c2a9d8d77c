//! SQLite Retail Sample Repository
//!
//! `is_final` 的唯一性由部分唯一索引保证；确认时先取得 Job 锁，清空、设置和写入样章片段
//! 都在同一事务内。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use super::database::{db_err, lock_job_in, parse_time, parse_uuid};
use super::segment_repo::upsert_retail_sample_in;
use super::DbPool;
use crate::application::ports::{
    RepositoryError, RetailSampleRecord, RetailSampleRepositoryPort, SegmentRecord,
};
use crate::domain::retail_sample::{ExcerptScores, SampleMode};
use crate::domain::JobStatus;

/// SQLite Retail Sample Repository
pub struct SqliteRetailSampleRepository {
    pool: DbPool,
}

impl SqliteRetailSampleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SAMPLE_COLUMNS: &str = "id, job_id, segment_id, segment_order, start_offset, end_offset, text, edited_text, \
     word_count, engagement, emotional_intensity, spoiler_risk, romantic_tension, overall_score, mode, rank, \
     is_final, created_at, confirmed_at";

#[derive(FromRow)]
struct RetailSampleRow {
    id: String,
    job_id: String,
    segment_id: String,
    segment_order: i64,
    start_offset: i64,
    end_offset: i64,
    text: String,
    edited_text: Option<String>,
    word_count: i64,
    engagement: f64,
    emotional_intensity: f64,
    spoiler_risk: f64,
    romantic_tension: f64,
    overall_score: f64,
    mode: String,
    rank: i64,
    is_final: bool,
    created_at: String,
    confirmed_at: Option<String>,
}

impl TryFrom<RetailSampleRow> for RetailSampleRecord {
    type Error = RepositoryError;

    fn try_from(row: RetailSampleRow) -> Result<Self, Self::Error> {
        Ok(RetailSampleRecord {
            id: parse_uuid(&row.id)?,
            job_id: parse_uuid(&row.job_id)?,
            segment_id: parse_uuid(&row.segment_id)?,
            segment_order: row.segment_order as u8,
            start_offset: row.start_offset as u32,
            end_offset: row.end_offset as u32,
            text: row.text,
            edited_text: row.edited_text,
            word_count: row.word_count as u32,
            scores: ExcerptScores {
                engagement: row.engagement,
                emotional_intensity: row.emotional_intensity,
                spoiler_risk: row.spoiler_risk,
                romantic_tension: row.romantic_tension,
            },
            overall_score: row.overall_score,
            mode: SampleMode::from_str(&row.mode).unwrap_or_default(),
            rank: row.rank as u32,
            is_final: row.is_final,
            created_at: parse_time(&row.created_at)?,
            confirmed_at: row.confirmed_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

#[async_trait]
impl RetailSampleRepositoryPort for SqliteRetailSampleRepository {
    async fn replace_candidates(
        &self,
        job_id: Uuid,
        candidates: &[RetailSampleRecord],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM retail_samples WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for sample in candidates {
            sqlx::query(&format!(
                "INSERT INTO retail_samples ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SAMPLE_COLUMNS
            ))
            .bind(sample.id.to_string())
            .bind(job_id.to_string())
            .bind(sample.segment_id.to_string())
            .bind(sample.segment_order as i64)
            .bind(sample.start_offset as i64)
            .bind(sample.end_offset as i64)
            .bind(&sample.text)
            .bind(&sample.edited_text)
            .bind(sample.word_count as i64)
            .bind(sample.scores.engagement)
            .bind(sample.scores.emotional_intensity)
            .bind(sample.scores.spoiler_risk)
            .bind(sample.scores.romantic_tension)
            .bind(sample.overall_score)
            .bind(sample.mode.as_str())
            .bind(sample.rank as i64)
            .bind(sample.is_final)
            .bind(sample.created_at.to_rfc3339())
            .bind(sample.confirmed_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<RetailSampleRecord>, RepositoryError> {
        let rows: Vec<RetailSampleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM retail_samples WHERE job_id = ? ORDER BY rank",
            SAMPLE_COLUMNS
        ))
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(RetailSampleRecord::try_from).collect()
    }

    async fn confirm(
        &self,
        job_id: Uuid,
        sample_id: Uuid,
        edited_text: Option<&str>,
        segment_title: &str,
    ) -> Result<(RetailSampleRecord, SegmentRecord), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_job_in(&mut tx, job_id, JobStatus::ChaptersPending).await?;

        sqlx::query("UPDATE retail_samples SET is_final = 0 WHERE job_id = ? AND is_final = 1")
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let row: Option<RetailSampleRow> = sqlx::query_as(&format!(
            r#"
            UPDATE retail_samples SET is_final = 1, edited_text = ?, confirmed_at = ?
            WHERE id = ? AND job_id = ?
            RETURNING {}
            "#,
            SAMPLE_COLUMNS
        ))
        .bind(edited_text)
        .bind(Utc::now().to_rfc3339())
        .bind(sample_id.to_string())
        .bind(job_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let row = row.ok_or_else(|| {
            RepositoryError::NotFound(format!("retail sample {} of job {}", sample_id, job_id))
        })?;

        let sample = RetailSampleRecord::try_from(row)?;
        let segment =
            upsert_retail_sample_in(&mut tx, job_id, segment_title, sample.effective_text())
                .await?;

        tx.commit().await.map_err(db_err)?;
        Ok((sample, segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{JobRepositoryPort, SegmentRepositoryPort};
    use crate::infrastructure::persistence::sqlite::job_repo::tests::{job, setup};
    use crate::infrastructure::persistence::sqlite::{
        SqliteJobRepository, SqliteSegmentRepository,
    };

    fn candidate(job_id: Uuid, rank: u32, overall: f64) -> RetailSampleRecord {
        RetailSampleRecord {
            id: Uuid::new_v4(),
            job_id,
            segment_id: Uuid::new_v4(),
            segment_order: 10,
            start_offset: 0,
            end_offset: 120,
            text: format!("Candidate {}.", rank),
            edited_text: None,
            word_count: 2,
            scores: ExcerptScores {
                engagement: 0.8,
                emotional_intensity: 0.5,
                spoiler_risk: 0.1,
                romantic_tension: 0.0,
            },
            overall_score: overall,
            mode: SampleMode::Standard,
            rank,
            is_final: false,
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    async fn repo_with_job() -> (SqliteRetailSampleRepository, Uuid) {
        let pool = setup().await;
        let job = job(JobStatus::ChaptersPending);
        SqliteJobRepository::new(pool.clone()).create(&job).await.unwrap();
        (SqliteRetailSampleRepository::new(pool), job.id)
    }

    #[tokio::test]
    async fn test_candidates_ordered_by_rank() {
        let (repo, job_id) = repo_with_job().await;
        let candidates = vec![candidate(job_id, 2, 0.4), candidate(job_id, 1, 0.9)];
        repo.replace_candidates(job_id, &candidates).await.unwrap();

        let found = repo.find_by_job(job_id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].rank, 1);
        assert_eq!(found[0].scores.engagement, 0.8);
    }

    #[tokio::test]
    async fn test_confirm_keeps_single_final_and_original_text() {
        let (repo, job_id) = repo_with_job().await;
        let candidates = vec![candidate(job_id, 1, 0.9), candidate(job_id, 2, 0.4)];
        repo.replace_candidates(job_id, &candidates).await.unwrap();

        let (_, first_segment) = repo
            .confirm(job_id, candidates[0].id, None, "Retail Sample")
            .await
            .unwrap();
        assert_eq!(first_segment.slot.order(), 99);
        assert_eq!(first_segment.text, "Candidate 1.");

        let (confirmed, segment) = repo
            .confirm(job_id, candidates[1].id, Some("Edited excerpt, second pick."), "Retail Sample")
            .await
            .unwrap();
        assert!(confirmed.is_final);
        assert_eq!(confirmed.text, "Candidate 2.");
        assert_eq!(confirmed.effective_text(), "Edited excerpt, second pick.");
        assert!(confirmed.confirmed_at.is_some());
        // 同一个样章片段被覆盖
        assert_eq!(segment.id, first_segment.id);
        assert_eq!(segment.text, "Edited excerpt, second pick.");
        assert_eq!(segment.word_count, 4);

        let finals: Vec<_> = repo
            .find_by_job(job_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_final)
            .collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].id, candidates[1].id);
    }

    #[tokio::test]
    async fn test_confirm_unknown_sample_keeps_previous_final() {
        let (repo, job_id) = repo_with_job().await;
        let candidates = vec![candidate(job_id, 1, 0.9)];
        repo.replace_candidates(job_id, &candidates).await.unwrap();
        repo.confirm(job_id, candidates[0].id, None, "Retail Sample")
            .await
            .unwrap();

        let err = repo
            .confirm(job_id, Uuid::new_v4(), None, "Retail Sample")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));

        let found = repo.find_by_job(job_id).await.unwrap();
        assert!(found[0].is_final);
    }

    #[tokio::test]
    async fn test_confirm_after_approval_changes_nothing() {
        let pool = setup().await;
        let jobs = SqliteJobRepository::new(pool.clone());
        let segments = SqliteSegmentRepository::new(pool.clone());
        let repo = SqliteRetailSampleRepository::new(pool);
        let job = job(JobStatus::ChaptersPending);
        jobs.create(&job).await.unwrap();

        let candidates = vec![candidate(job.id, 1, 0.9)];
        repo.replace_candidates(job.id, &candidates).await.unwrap();
        // 审批与确认并发时，审批先提交
        jobs.transition(job.id, &[JobStatus::ChaptersPending], JobStatus::ChaptersApproved)
            .await
            .unwrap();

        let err = repo
            .confirm(job.id, candidates[0].id, None, "Retail Sample")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let found = repo.find_by_job(job.id).await.unwrap();
        assert!(!found[0].is_final);
        assert!(found[0].confirmed_at.is_none());
        assert!(segments.find_by_job(job.id).await.unwrap().is_empty());
    }
}
