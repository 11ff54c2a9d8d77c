//! SQLite Segment Repository
//!
//! 顺序号的读-改-写都在同一个事务里完成：先 `lock_job_in` 取得写锁并确认 Job 状态，
//! 再根据已有槽位重建 `SegmentOrderAllocator`。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::database::{db_err, lock_job_in, parse_time, parse_uuid};
use super::DbPool;
use crate::application::ports::{
    ApprovalSummary, RepositoryError, SegmentAudio, SegmentRecord, SegmentRepositoryPort,
};
use crate::domain::segment::{char_count, word_count};
use crate::domain::{
    DomainError, JobStatus, RepackEntry, SegmentOrderAllocator, SegmentSlot, SegmentStatus,
    SegmentType,
};

/// SQLite Segment Repository
pub struct SqliteSegmentRepository {
    pool: DbPool,
}

impl SqliteSegmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SEGMENT_COLUMNS: &str = "id, job_id, source_order, chapter_index, segment_type, segment_order, title, text, \
     word_count, char_count, status, audio_key, duration_ms, size_bytes, attempts, error_message, \
     created_at, updated_at";

#[derive(FromRow)]
struct SegmentRow {
    id: String,
    job_id: String,
    source_order: i64,
    chapter_index: i64,
    segment_type: String,
    segment_order: Option<i64>,
    title: String,
    text: String,
    word_count: i64,
    char_count: i64,
    status: String,
    audio_key: Option<String>,
    duration_ms: Option<i64>,
    size_bytes: Option<i64>,
    attempts: i64,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SegmentRow> for SegmentRecord {
    type Error = RepositoryError;

    fn try_from(row: SegmentRow) -> Result<Self, Self::Error> {
        let segment_type = SegmentType::from_str(&row.segment_type).ok_or_else(|| {
            RepositoryError::SerializationError(format!("unknown segment type {}", row.segment_type))
        })?;
        let order = row.segment_order.ok_or_else(|| {
            RepositoryError::SerializationError(format!("segment {} has no order", row.id))
        })?;
        let order = u8::try_from(order)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(SegmentRecord {
            id: parse_uuid(&row.id)?,
            job_id: parse_uuid(&row.job_id)?,
            source_order: row.source_order,
            chapter_index: row.chapter_index,
            slot: SegmentSlot::new(segment_type, order)?,
            title: row.title,
            text: row.text,
            word_count: row.word_count as u32,
            char_count: row.char_count as u32,
            status: SegmentStatus::from_str(&row.status).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown segment status {}", row.status))
            })?,
            audio_key: row.audio_key,
            duration_ms: row.duration_ms.map(|d| d as u64),
            size_bytes: row.size_bytes.map(|s| s as u64),
            attempts: row.attempts as u32,
            error_message: row.error_message,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

async fn load_for_job(
    conn: &mut SqliteConnection,
    job_id: Uuid,
) -> Result<Vec<SegmentRecord>, RepositoryError> {
    let rows: Vec<SegmentRow> = sqlx::query_as(&format!(
        "SELECT {} FROM segments WHERE job_id = ? ORDER BY segment_order",
        SEGMENT_COLUMNS
    ))
    .bind(job_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.into_iter().map(SegmentRecord::try_from).collect()
}

async fn insert_one(
    conn: &mut SqliteConnection,
    segment: &SegmentRecord,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO segments (id, job_id, source_order, chapter_index, segment_type, segment_order,
                              title, text, word_count, char_count, status, audio_key, duration_ms,
                              size_bytes, attempts, error_message, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(segment.id.to_string())
    .bind(segment.job_id.to_string())
    .bind(segment.source_order)
    .bind(segment.chapter_index)
    .bind(segment.slot.segment_type().as_str())
    .bind(segment.slot.order() as i64)
    .bind(&segment.title)
    .bind(&segment.text)
    .bind(segment.word_count as i64)
    .bind(segment.char_count as i64)
    .bind(segment.status.as_str())
    .bind(&segment.audio_key)
    .bind(segment.duration_ms.map(|d| d as i64))
    .bind(segment.size_bytes.map(|s| s as i64))
    .bind(segment.attempts as i64)
    .bind(&segment.error_message)
    .bind(segment.created_at.to_rfc3339())
    .bind(segment.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

fn take_segment(
    segments: &mut Vec<SegmentRecord>,
    segment_id: Uuid,
) -> Result<SegmentRecord, RepositoryError> {
    let position = segments
        .iter()
        .position(|s| s.id == segment_id)
        .ok_or_else(|| RepositoryError::NotFound(format!("segment {}", segment_id)))?;
    Ok(segments.remove(position))
}

/// 创建或更新唯一的试听样章片段
///
/// 调用方负责事务和 Job 锁；样章片段只会有一个，固定在 order 99。
pub(crate) async fn upsert_retail_sample_in(
    conn: &mut SqliteConnection,
    job_id: Uuid,
    title: &str,
    text: &str,
) -> Result<SegmentRecord, RepositoryError> {
    let segments = load_for_job(&mut *conn, job_id).await?;
    let now = Utc::now();

    let existing = segments
        .iter()
        .find(|s| s.slot.segment_type() == SegmentType::RetailSample)
        .cloned();

    match existing {
        Some(mut segment) => {
            segment.title = title.to_string();
            segment.text = text.to_string();
            segment.word_count = word_count(text) as u32;
            segment.char_count = char_count(text) as u32;
            segment.status = SegmentStatus::PendingReview;
            segment.audio_key = None;
            segment.duration_ms = None;
            segment.size_bytes = None;
            segment.updated_at = now;

            sqlx::query(
                r#"
                UPDATE segments SET title = ?, text = ?, word_count = ?, char_count = ?,
                    status = ?, audio_key = NULL, duration_ms = NULL, size_bytes = NULL,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&segment.title)
            .bind(&segment.text)
            .bind(segment.word_count as i64)
            .bind(segment.char_count as i64)
            .bind(segment.status.as_str())
            .bind(now.to_rfc3339())
            .bind(segment.id.to_string())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

            Ok(segment)
        }
        None => {
            let mut allocator =
                SegmentOrderAllocator::from_slots(job_id, segments.iter().map(|s| s.slot));
            let slot = allocator.allocate(SegmentType::RetailSample)?;
            let source_order = segments
                .iter()
                .map(|s| s.source_order)
                .max()
                .map_or(0, |max| max + 1);

            let segment = SegmentRecord::new(job_id, source_order, slot, title, text);
            insert_one(&mut *conn, &segment).await?;
            Ok(segment)
        }
    }
}

/// 审批时片段是否纳入
///
/// 片头片尾和试听样章总是纳入；其余片段在给出选择列表时以列表为准。
fn is_included(segment: &SegmentRecord, selected: Option<&HashSet<Uuid>>) -> bool {
    let segment_type = segment.slot.segment_type();
    if segment_type.is_credits() || segment_type == SegmentType::RetailSample {
        return true;
    }
    match selected {
        Some(ids) => ids.contains(&segment.id),
        None => segment.status != SegmentStatus::Excluded,
    }
}

#[async_trait]
impl SegmentRepositoryPort for SqliteSegmentRepository {
    async fn insert_batch(&self, segments: &[SegmentRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut allocators: HashMap<Uuid, SegmentOrderAllocator> = HashMap::new();
        for segment in segments {
            if !allocators.contains_key(&segment.job_id) {
                let existing = load_for_job(&mut tx, segment.job_id).await?;
                allocators.insert(
                    segment.job_id,
                    SegmentOrderAllocator::from_slots(
                        segment.job_id,
                        existing.iter().map(|s| s.slot),
                    ),
                );
            }
            if let Some(allocator) = allocators.get_mut(&segment.job_id) {
                allocator.assign(segment.slot.segment_type(), segment.slot.order())?;
            }
            insert_one(&mut tx, segment).await?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<SegmentRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_for_job(&mut conn, job_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SegmentRecord>, RepositoryError> {
        let row: Option<SegmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM segments WHERE id = ?",
            SEGMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(SegmentRecord::try_from).transpose()
    }

    async fn reorder(&self, job_id: Uuid, ordered_ids: &[Uuid]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_job_in(&mut tx, job_id, JobStatus::ChaptersPending).await?;

        let existing: HashSet<Uuid> = load_for_job(&mut tx, job_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let requested: HashSet<Uuid> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() || requested != existing {
            return Err(RepositoryError::NotFound(format!(
                "reorder of job {} must list each of its {} segments exactly once",
                job_id,
                existing.len()
            )));
        }

        let now = Utc::now().to_rfc3339();
        for (index, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE segments SET chapter_index = ?, updated_at = ? WHERE id = ?")
                .bind(index as i64)
                .bind(&now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn change_type(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        segment_type: SegmentType,
    ) -> Result<SegmentRecord, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_job_in(&mut tx, job_id, JobStatus::ChaptersPending).await?;

        let mut segments = load_for_job(&mut tx, job_id).await?;
        let mut allocator =
            SegmentOrderAllocator::from_slots(job_id, segments.iter().map(|s| s.slot));
        let mut segment = take_segment(&mut segments, segment_id)?;

        let slot = allocator.reallocate(segment.slot, segment_type)?;
        if slot == segment.slot {
            return Ok(segment);
        }
        SegmentOrderAllocator::from_slots(job_id, segments.iter().map(|s| s.slot))
            .validate(slot.segment_type(), slot.order())?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE segments SET segment_type = ?, segment_order = ?, updated_at = ? WHERE id = ?",
        )
        .bind(slot.segment_type().as_str())
        .bind(slot.order() as i64)
        .bind(now.to_rfc3339())
        .bind(segment_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        segment.slot = slot;
        segment.updated_at = now;
        Ok(segment)
    }

    async fn set_included(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        included: bool,
    ) -> Result<SegmentRecord, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_job_in(&mut tx, job_id, JobStatus::ChaptersPending).await?;

        let mut segments = load_for_job(&mut tx, job_id).await?;
        let mut segment = take_segment(&mut segments, segment_id)?;

        let status = match (included, segment.status) {
            (false, _) => SegmentStatus::Excluded,
            (true, SegmentStatus::Excluded) => SegmentStatus::PendingReview,
            (true, current) => current,
        };
        if status == segment.status {
            return Ok(segment);
        }

        let now = Utc::now();
        sqlx::query("UPDATE segments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now.to_rfc3339())
            .bind(segment_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        segment.status = status;
        segment.updated_at = now;
        Ok(segment)
    }

    async fn approve(
        &self,
        job_id: Uuid,
        selected: Option<&[Uuid]>,
    ) -> Result<ApprovalSummary, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_job_in(&mut tx, job_id, JobStatus::ChaptersPending).await?;

        let segments = load_for_job(&mut tx, job_id).await?;

        let selected: Option<HashSet<Uuid>> = selected.map(|ids| ids.iter().copied().collect());
        if let Some(ids) = &selected {
            if let Some(unknown) = ids.iter().find(|id| !segments.iter().any(|s| s.id == **id)) {
                return Err(RepositoryError::NotFound(format!(
                    "segment {} does not belong to job {}",
                    unknown, job_id
                )));
            }
        }

        let entries: Vec<RepackEntry> = segments
            .iter()
            .map(|s| RepackEntry {
                segment_id: s.id,
                segment_type: s.slot.segment_type(),
                chapter_index: s.chapter_index,
                source_order: s.source_order,
                included: is_included(s, selected.as_ref()),
            })
            .collect();

        if !entries
            .iter()
            .any(|e| e.included && e.segment_type == SegmentType::BodyChapter)
        {
            return Err(DomainError::NoEligibleBodyChapter.into());
        }
        let samples = entries
            .iter()
            .filter(|e| e.segment_type == SegmentType::RetailSample)
            .count();
        if samples != 1 {
            return Err(DomainError::RetailSampleRequired { found: samples }.into());
        }

        let slots = SegmentOrderAllocator::repack(&entries)?;

        // 先清空顺序号，逐行写入新值时不会撞上 UNIQUE(job_id, segment_order)
        sqlx::query("UPDATE segments SET segment_order = NULL WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let now = Utc::now().to_rfc3339();
        let mut summary = ApprovalSummary {
            approved: 0,
            excluded: 0,
            already_completed: 0,
        };
        let mut written = SegmentOrderAllocator::new(job_id);
        for (segment_id, slot) in slots {
            let slot = written.assign(slot.segment_type(), slot.order())?;
            let included = entries
                .iter()
                .any(|e| e.segment_id == segment_id && e.included);
            let current = segments
                .iter()
                .find(|s| s.id == segment_id)
                .map(|s| s.status)
                .unwrap_or(SegmentStatus::PendingReview);

            let status = match (included, current) {
                (false, _) => {
                    summary.excluded += 1;
                    SegmentStatus::Excluded
                }
                (true, SegmentStatus::Completed) => {
                    summary.already_completed += 1;
                    SegmentStatus::Completed
                }
                (true, _) => {
                    summary.approved += 1;
                    SegmentStatus::Approved
                }
            };

            sqlx::query(
                "UPDATE segments SET segment_order = ?, status = ?, updated_at = ? WHERE id = ?",
            )
            .bind(slot.order() as i64)
            .bind(status.as_str())
            .bind(&now)
            .bind(segment_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(JobStatus::ChaptersApproved.as_str())
            .bind(&now)
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::info!(
            job_id = %job_id,
            approved = summary.approved,
            excluded = summary.excluded,
            already_completed = summary.already_completed,
            "Chapters approved"
        );
        Ok(summary)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE segments SET status = 'processing', updated_at = ? WHERE id = ? AND status IN ('approved', 'processing')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        audio: &SegmentAudio,
        attempts: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE segments SET status = 'completed', audio_key = ?, duration_ms = ?, size_bytes = ?,
                attempts = ?, error_message = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&audio.audio_key)
        .bind(audio.duration_ms as i64)
        .bind(audio.size_bytes as i64)
        .bind(attempts as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        attempts: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE segments SET status = 'failed', error_message = ?, attempts = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(attempts as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn reset_failed(&self, job_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE segments SET status = 'pending_review', error_message = NULL, attempts = 0, updated_at = ? WHERE job_id = ? AND status = 'failed'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn release_processing(&self, job_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE segments SET status = 'approved', updated_at = ? WHERE job_id = ? AND status = 'processing'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::JobRepositoryPort;
    use crate::infrastructure::persistence::sqlite::job_repo::tests::{job, setup};
    use crate::infrastructure::persistence::sqlite::SqliteJobRepository;

    struct Fixture {
        jobs: SqliteJobRepository,
        repo: SqliteSegmentRepository,
        job_id: Uuid,
        segments: Vec<SegmentRecord>,
    }

    async fn fixture() -> Fixture {
        fixture_with_sample(true).await
    }

    /// 片头 + 前言 + 三个正文章节 + 片尾，可选试听样章
    async fn fixture_with_sample(with_sample: bool) -> Fixture {
        let pool = setup().await;
        let jobs = SqliteJobRepository::new(pool.clone());
        let repo = SqliteSegmentRepository::new(pool);

        let job = job(JobStatus::ChaptersPending);
        jobs.create(&job).await.unwrap();

        let mut allocator = SegmentOrderAllocator::new(job.id);
        let mut layout = vec![
            (SegmentType::OpeningCredits, "Opening Credits"),
            (SegmentType::FrontMatter, "Prologue"),
            (SegmentType::BodyChapter, "Chapter 1"),
            (SegmentType::BodyChapter, "Chapter 2"),
            (SegmentType::BodyChapter, "Chapter 3"),
            (SegmentType::ClosingCredits, "Closing Credits"),
        ];
        if with_sample {
            layout.push((SegmentType::RetailSample, "Retail Sample"));
        }
        let segments: Vec<SegmentRecord> = layout
            .iter()
            .enumerate()
            .map(|(i, (ty, title))| {
                let slot = allocator.allocate(*ty).unwrap();
                SegmentRecord::new(job.id, i as i64 - 1, slot, *title, format!("{} text.", title))
            })
            .collect();
        repo.insert_batch(&segments).await.unwrap();

        Fixture {
            jobs,
            repo,
            job_id: job.id,
            segments,
        }
    }

    fn orders_of(segments: &[SegmentRecord]) -> Vec<(String, u8)> {
        segments
            .iter()
            .map(|s| (s.title.clone(), s.slot.order()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_find_by_job_ordered() {
        let f = fixture().await;
        let found = f.repo.find_by_job(f.job_id).await.unwrap();

        let orders: Vec<u8> = found.iter().map(|s| s.slot.order()).collect();
        assert_eq!(orders, vec![0, 1, 10, 11, 12, 98, 99]);
        assert!(found.iter().all(|s| s.status == SegmentStatus::PendingReview));

        let one = f.repo.find_by_id(f.segments[2].id).await.unwrap().unwrap();
        assert_eq!(one.title, "Chapter 1");
    }

    #[tokio::test]
    async fn test_insert_batch_rejects_taken_order() {
        let f = fixture().await;
        let chapter4 = SegmentRecord::new(
            f.job_id,
            10,
            SegmentSlot::new(SegmentType::BodyChapter, 13).unwrap(),
            "Chapter 4",
            "Four.",
        );
        let clash = SegmentRecord::new(
            f.job_id,
            11,
            SegmentSlot::new(SegmentType::BodyChapter, 12).unwrap(),
            "Chapter 5",
            "Five.",
        );

        let err = f.repo.insert_batch(&[chapter4, clash]).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Domain(DomainError::OrderInUse { order: 12 })
        ));
        // 整批回滚
        assert_eq!(f.repo.find_by_job(f.job_id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_reorder_requires_exact_permutation() {
        let f = fixture().await;
        let mut ids: Vec<Uuid> = f.segments.iter().map(|s| s.id).collect();

        // 缺一个
        let err = f.repo.reorder(f.job_id, &ids[1..]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));

        // 重复
        let mut duplicated = ids.clone();
        duplicated[0] = duplicated[1];
        assert!(f.repo.reorder(f.job_id, &duplicated).await.is_err());

        ids.swap(2, 4);
        f.repo.reorder(f.job_id, &ids).await.unwrap();
        let chapter3 = f.repo.find_by_id(f.segments[4].id).await.unwrap().unwrap();
        assert_eq!(chapter3.chapter_index, 2);
        // 顺序号在审批前不变
        assert_eq!(chapter3.slot.order(), 12);
    }

    #[tokio::test]
    async fn test_change_type_reallocates_within_new_range() {
        let f = fixture().await;

        let changed = f
            .repo
            .change_type(f.job_id, f.segments[4].id, SegmentType::BackMatter)
            .await
            .unwrap();
        assert_eq!(changed.slot.segment_type(), SegmentType::BackMatter);
        assert_eq!(changed.slot.order(), 80);

        let changed = f
            .repo
            .change_type(f.job_id, f.segments[1].id, SegmentType::BodyChapter)
            .await
            .unwrap();
        // 12 已由上一步释放
        assert_eq!(changed.slot.order(), 12);
    }

    #[tokio::test]
    async fn test_change_type_capacity_exceeded_keeps_slot() {
        let f = fixture().await;

        let err = f
            .repo
            .change_type(f.job_id, f.segments[2].id, SegmentType::OpeningCredits)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Domain(DomainError::CapacityExceeded { .. })
        ));

        let unchanged = f.repo.find_by_id(f.segments[2].id).await.unwrap().unwrap();
        assert_eq!(unchanged.slot.order(), 10);
    }

    #[tokio::test]
    async fn test_review_mutations_require_chapters_pending() {
        let f = fixture().await;
        f.jobs
            .transition(f.job_id, &[JobStatus::ChaptersPending], JobStatus::Cancelled)
            .await
            .unwrap();

        let err = f
            .repo
            .set_included(f.job_id, f.segments[2].id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_approve_repacks_by_chapter_index() {
        let f = fixture().await;
        let mut ids: Vec<Uuid> = f.segments.iter().map(|s| s.id).collect();
        // Chapter 3 移到 Chapter 1 之前
        let moved = ids.remove(4);
        ids.insert(2, moved);
        f.repo.reorder(f.job_id, &ids).await.unwrap();
        f.repo
            .set_included(f.job_id, f.segments[3].id, false)
            .await
            .unwrap();

        let summary = f.repo.approve(f.job_id, None).await.unwrap();
        assert_eq!(summary.approved, 6);
        assert_eq!(summary.excluded, 1);

        let found = f.repo.find_by_job(f.job_id).await.unwrap();
        assert_eq!(
            orders_of(&found),
            vec![
                ("Opening Credits".to_string(), 0),
                ("Prologue".to_string(), 1),
                ("Chapter 3".to_string(), 10),
                ("Chapter 1".to_string(), 11),
                ("Chapter 2".to_string(), 12),
                ("Closing Credits".to_string(), 98),
                ("Retail Sample".to_string(), 99),
            ]
        );
        assert_eq!(found[4].status, SegmentStatus::Excluded);

        let job = f.jobs.find_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ChaptersApproved);
    }

    #[tokio::test]
    async fn test_approve_with_selection_excludes_unlisted() {
        let f = fixture().await;
        let selected = [f.segments[3].id];

        let summary = f.repo.approve(f.job_id, Some(&selected)).await.unwrap();
        // 片头、片尾、样章和选中的 Chapter 2
        assert_eq!(summary.approved, 4);
        assert_eq!(summary.excluded, 3);

        let chapter2 = f.repo.find_by_id(f.segments[3].id).await.unwrap().unwrap();
        assert_eq!(chapter2.slot.order(), 10);
        assert_eq!(chapter2.status, SegmentStatus::Approved);
    }

    #[tokio::test]
    async fn test_approve_without_body_chapter_changes_nothing() {
        let f = fixture().await;
        let selected = [f.segments[1].id];

        let err = f.repo.approve(f.job_id, Some(&selected)).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Domain(DomainError::NoEligibleBodyChapter)
        ));

        let found = f.repo.find_by_job(f.job_id).await.unwrap();
        assert!(found.iter().all(|s| s.status == SegmentStatus::PendingReview));
        let job = f.jobs.find_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ChaptersPending);
    }

    #[tokio::test]
    async fn test_approve_without_retail_sample_changes_nothing() {
        let f = fixture_with_sample(false).await;

        let err = f.repo.approve(f.job_id, None).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Domain(DomainError::RetailSampleRequired { found: 0 })
        ));

        let found = f.repo.find_by_job(f.job_id).await.unwrap();
        assert!(found.iter().all(|s| s.status == SegmentStatus::PendingReview));
        let job = f.jobs.find_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ChaptersPending);
    }

    #[tokio::test]
    async fn test_approve_keeps_previously_excluded_sample() {
        let f = fixture().await;
        let sample_id = f.segments[6].id;
        // 旧数据里被排除的样章在审批时仍然纳入
        sqlx::query("UPDATE segments SET status = 'excluded' WHERE id = ?")
            .bind(sample_id.to_string())
            .execute(&f.repo.pool)
            .await
            .unwrap();

        f.repo.approve(f.job_id, None).await.unwrap();
        let sample = f.repo.find_by_id(sample_id).await.unwrap().unwrap();
        assert_eq!(sample.status, SegmentStatus::Approved);
        assert_eq!(sample.slot.order(), 99);
    }

    #[tokio::test]
    async fn test_synthesis_status_updates() {
        let f = fixture().await;
        f.repo.approve(f.job_id, None).await.unwrap();
        let id = f.segments[2].id;

        assert!(f.repo.mark_processing(id).await.unwrap());
        // 重新领取同样命中
        assert!(f.repo.mark_processing(id).await.unwrap());
        assert_eq!(f.repo.release_processing(f.job_id).await.unwrap(), 1);

        f.repo.mark_failed(id, "boom", 4).await.unwrap();
        assert!(!f.repo.mark_processing(id).await.unwrap());
        assert_eq!(f.repo.reset_failed(f.job_id).await.unwrap(), 1);

        let audio = SegmentAudio {
            audio_key: "jobs/x/segments/y.wav".to_string(),
            duration_ms: 1500,
            size_bytes: 2048,
        };
        f.repo.mark_completed(id, &audio, 1).await.unwrap();
        let done = f.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.status, SegmentStatus::Completed);
        assert_eq!(done.duration_ms, Some(1500));
        assert_eq!(done.attempts, 1);
        assert!(done.error_message.is_none());
    }
}
