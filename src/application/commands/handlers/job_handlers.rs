//! Job Command Handlers - 导入、切分、取消、人工重试

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::commands::{CancelJob, IngestManuscript, ParseJob, RetryJob};
use crate::application::error::{ApplicationError, ErrorContext};
use crate::application::ports::{
    keys, JobQueuePort, JobRecord, JobRepositoryPort, ObjectStoragePort, SegmentRecord,
    SegmentRepositoryPort, WorkItem, WorkStage,
};
use crate::domain::retail_sample::SampleMode;
use crate::domain::{
    credits, parse_manuscript, DetectionMode, JobStatus, Phase, SegmentOrderAllocator,
    SegmentType,
};

// ============================================================================
// IngestManuscript
// ============================================================================

/// 导入响应（立即返回，status=pending）
#[derive(Debug, Clone)]
pub struct IngestResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Job 默认值
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub voice_id: String,
    pub detection_mode: DetectionMode,
    pub sample_mode: SampleMode,
}

/// IngestManuscript Handler - 保存稿件、创建 Job、入队
pub struct IngestManuscriptHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    storage: Arc<dyn ObjectStoragePort>,
    queue: Arc<dyn JobQueuePort>,
    defaults: JobDefaults,
}

impl IngestManuscriptHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        storage: Arc<dyn ObjectStoragePort>,
        queue: Arc<dyn JobQueuePort>,
        defaults: JobDefaults,
    ) -> Self {
        Self {
            job_repo,
            storage,
            queue,
            defaults,
        }
    }

    pub async fn handle(&self, command: IngestManuscript) -> Result<IngestResponse, ApplicationError> {
        let job_id = Uuid::new_v4();
        let ctx = ErrorContext::new(job_id, Phase::Ingestion);

        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(ApplicationError::validation(ctx, "title must not be empty"));
        }

        let manuscript_key = keys::manuscript(job_id);
        self.storage
            .put(&manuscript_key, command.manuscript_text.as_bytes())
            .await?;

        let now = Utc::now();
        let job = JobRecord {
            id: job_id,
            title,
            author: command.author.filter(|a| !a.trim().is_empty()),
            narrator: command.narrator.filter(|n| !n.trim().is_empty()),
            voice_id: command
                .voice_id
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| self.defaults.voice_id.clone()),
            status: JobStatus::Pending,
            manuscript_key,
            detection_mode: command.detection_mode.unwrap_or(self.defaults.detection_mode),
            sample_mode: command.sample_mode.unwrap_or(self.defaults.sample_mode),
            segment_count: 0,
            track_count: 0,
            manifest_key: None,
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.job_repo.create(&job).await?;
        self.queue.enqueue(WorkItem::new(job_id, WorkStage::Parse)).await?;

        tracing::info!(
            job_id = %job_id,
            title = %job.title,
            chars = command.manuscript_text.chars().count(),
            "Manuscript ingested"
        );

        Ok(IngestResponse {
            job_id,
            status: JobStatus::Pending,
        })
    }
}

// ============================================================================
// ParseJob
// ============================================================================

/// ParseJob Handler - 切分稿件并分配顺序号
///
/// pending|parsing -> parsing -> chapters_pending；失败时 parsing -> failed。
/// 片段已存在（崩溃续跑或人工重试）时跳过切分，直接回到待审核。
pub struct ParseJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    storage: Arc<dyn ObjectStoragePort>,
}

impl ParseJobHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        storage: Arc<dyn ObjectStoragePort>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
            storage,
        }
    }

    pub async fn handle(&self, command: ParseJob) -> Result<Vec<SegmentRecord>, ApplicationError> {
        let job_id = command.job_id;
        let ctx = ErrorContext::new(job_id, Phase::Parsing);

        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

        let claimed = self
            .job_repo
            .transition(job_id, &[JobStatus::Pending, JobStatus::Parsing], JobStatus::Parsing)
            .await?;
        if !claimed {
            return Err(ApplicationError::invalid_state(
                ctx,
                format!("job is {}, cannot parse", job.status),
            ));
        }

        let existing = self.segment_repo.find_by_job(job_id).await?;
        let segments = if existing.is_empty() {
            match self.segment_manuscript(&job, ctx).await {
                Ok(segments) => segments,
                Err(err) => {
                    self.fail(job_id, &err).await?;
                    return Err(err);
                }
            }
        } else {
            tracing::info!(
                job_id = %job_id,
                segments = existing.len(),
                "Segments already exist, skipping segmentation"
            );
            existing
        };

        let moved = self
            .job_repo
            .transition(job_id, &[JobStatus::Parsing], JobStatus::ChaptersPending)
            .await?;
        if !moved {
            return Err(ApplicationError::invalid_state(
                ctx,
                "job left parsing state while segmenting",
            ));
        }

        tracing::info!(
            job_id = %job_id,
            segments = segments.len(),
            "Job awaiting chapter review"
        );

        Ok(segments)
    }

    async fn segment_manuscript(
        &self,
        job: &JobRecord,
        ctx: ErrorContext,
    ) -> Result<Vec<SegmentRecord>, ApplicationError> {
        let bytes = self.storage.get(&job.manuscript_key).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ApplicationError::parse(ctx, format!("manuscript is not UTF-8: {}", e)))?;

        let units = parse_manuscript(&text, job.detection_mode)
            .map_err(|e| ApplicationError::from_domain(e, ctx))?;

        let mut allocator = SegmentOrderAllocator::new(job.id);
        let mut allocate = |segment_type: SegmentType| {
            allocator.allocate(segment_type).map_err(|e| {
                ApplicationError::parse(
                    ctx,
                    format!("{}; merge chapters to fit the distribution limits", e),
                )
            })
        };

        let author = job.author.as_deref();
        let narrator = job.narrator.as_deref();
        let mut records = Vec::with_capacity(units.len() + 2);

        records.push(SegmentRecord::new(
            job.id,
            -1,
            allocate(SegmentType::OpeningCredits)?,
            credits::OPENING_TITLE,
            credits::opening_text(&job.title, author, narrator),
        ));

        for unit in &units {
            let slot = allocate(unit.segment_type)?;
            records.push(SegmentRecord::new(
                job.id,
                unit.source_order as i64,
                slot,
                unit.title.clone(),
                unit.text.clone(),
            ));
        }

        records.push(SegmentRecord::new(
            job.id,
            units.len() as i64,
            allocate(SegmentType::ClosingCredits)?,
            credits::CLOSING_TITLE,
            credits::closing_text(&job.title, author, narrator),
        ));

        self.segment_repo
            .insert_batch(&records)
            .await
            .map_err(|e| ApplicationError::from_repository(e, ctx))?;
        self.job_repo
            .update_segment_count(job.id, records.len() as u32)
            .await?;

        records.sort_by_key(|r| r.slot.order());
        Ok(records)
    }

    async fn fail(&self, job_id: Uuid, err: &ApplicationError) -> Result<(), ApplicationError> {
        let failure = err.to_failure(Phase::Parsing);
        tracing::error!(
            job_id = %job_id,
            reference = %failure.reference,
            error = %err,
            "Parse failed"
        );
        self.job_repo
            .mark_failed(job_id, &[JobStatus::Parsing], &failure)
            .await?;
        Ok(())
    }
}

// ============================================================================
// CancelJob
// ============================================================================

/// CancelJob Handler - 任意非终态 -> cancelled
///
/// Worker 在每个片段合成前后轮询状态，取消会很快生效。
pub struct CancelJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
}

impl CancelJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>) -> Self {
        Self { job_repo }
    }

    pub async fn handle(&self, command: CancelJob) -> Result<(), ApplicationError> {
        let job_id = command.job_id;
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

        let cancelled = self
            .job_repo
            .transition(job_id, &JobStatus::non_terminal(), JobStatus::Cancelled)
            .await?;
        if !cancelled {
            return Err(ApplicationError::invalid_state(
                ErrorContext::new(job_id, Phase::Review),
                format!("job is {}, cannot cancel", job.status),
            ));
        }

        tracing::info!(job_id = %job_id, from = %job.status, "Job cancelled");
        Ok(())
    }
}

// ============================================================================
// RetryJob
// ============================================================================

/// RetryJob Handler - failed -> pending 并重新入队
///
/// 与自动重试计数无关。失败片段回到待审核，已完成片段保持不变。
pub struct RetryJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    queue: Arc<dyn JobQueuePort>,
}

impl RetryJobHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        queue: Arc<dyn JobQueuePort>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
            queue,
        }
    }

    pub async fn handle(&self, command: RetryJob) -> Result<(), ApplicationError> {
        let job_id = command.job_id;
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

        if !self.job_repo.reset_for_retry(job_id).await? {
            return Err(ApplicationError::invalid_state(
                ErrorContext::new(job_id, Phase::Review),
                format!("job is {}, only failed jobs can be retried", job.status),
            ));
        }

        let reset = self.segment_repo.reset_failed(job_id).await?;
        self.queue.enqueue(WorkItem::new(job_id, WorkStage::Parse)).await?;

        tracing::info!(
            job_id = %job_id,
            reset_segments = reset,
            "Job re-enqueued by manual retry"
        );
        Ok(())
    }
}
