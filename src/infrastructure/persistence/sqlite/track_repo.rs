//! SQLite Track Repository

use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use super::database::{db_err, parse_time, parse_uuid};
use super::DbPool;
use crate::application::ports::{RepositoryError, TrackRecord, TrackRepositoryPort};
use crate::domain::{SegmentSlot, SegmentType};

/// SQLite Track Repository
pub struct SqliteTrackRepository {
    pool: DbPool,
}

impl SqliteTrackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TrackRow {
    id: String,
    job_id: String,
    segment_id: String,
    position: i64,
    segment_type: String,
    segment_order: i64,
    filename: String,
    title: String,
    audio_key: String,
    duration_ms: i64,
    size_bytes: i64,
    created_at: String,
}

impl TryFrom<TrackRow> for TrackRecord {
    type Error = RepositoryError;

    fn try_from(row: TrackRow) -> Result<Self, Self::Error> {
        let segment_type = SegmentType::from_str(&row.segment_type).ok_or_else(|| {
            RepositoryError::SerializationError(format!("unknown segment type {}", row.segment_type))
        })?;
        let order = u8::try_from(row.segment_order)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(TrackRecord {
            id: parse_uuid(&row.id)?,
            job_id: parse_uuid(&row.job_id)?,
            segment_id: parse_uuid(&row.segment_id)?,
            position: row.position as u32,
            slot: SegmentSlot::new(segment_type, order)?,
            filename: row.filename,
            title: row.title,
            audio_key: row.audio_key,
            duration_ms: row.duration_ms as u64,
            size_bytes: row.size_bytes as u64,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

#[async_trait]
impl TrackRepositoryPort for SqliteTrackRepository {
    async fn replace_for_job(
        &self,
        job_id: Uuid,
        tracks: &[TrackRecord],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM tracks WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for track in tracks {
            sqlx::query(
                r#"
                INSERT INTO tracks (id, job_id, segment_id, position, segment_type, segment_order,
                                    filename, title, audio_key, duration_ms, size_bytes, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(track.id.to_string())
            .bind(job_id.to_string())
            .bind(track.segment_id.to_string())
            .bind(track.position as i64)
            .bind(track.slot.segment_type().as_str())
            .bind(track.slot.order() as i64)
            .bind(&track.filename)
            .bind(&track.title)
            .bind(&track.audio_key)
            .bind(track.duration_ms as i64)
            .bind(track.size_bytes as i64)
            .bind(track.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<TrackRecord>, RepositoryError> {
        let rows: Vec<TrackRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, segment_id, position, segment_type, segment_order, filename, title,
                   audio_key, duration_ms, size_bytes, created_at
            FROM tracks WHERE job_id = ? ORDER BY position
            "#,
        )
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TrackRecord::try_from).collect()
    }
}
