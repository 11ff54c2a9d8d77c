//! Review Command Handlers - 章节审核
//!
//! 只在 chapters_pending 状态下允许修改；状态检查和顺序号读-改-写都在仓储事务内完成。

use std::sync::Arc;
use uuid::Uuid;

use crate::application::commands::{
    ApproveChapters, ReorderSegments, SetSegmentIncluded, SetSegmentType,
};
use crate::application::error::{ApplicationError, ErrorContext};
use crate::application::ports::{
    ApprovalSummary, JobQueuePort, JobRepositoryPort, SegmentRecord, SegmentRepositoryPort,
    WorkItem, WorkStage,
};
use crate::domain::{Phase, SegmentType};

fn review_ctx(job_id: Uuid) -> ErrorContext {
    ErrorContext::new(job_id, Phase::Review)
}

async fn ensure_job(
    job_repo: &Arc<dyn JobRepositoryPort>,
    job_id: Uuid,
) -> Result<(), ApplicationError> {
    job_repo
        .find_by_id(job_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApplicationError::not_found("Job", job_id))
}

// ============================================================================
// ReorderSegments
// ============================================================================

/// ReorderSegments Handler - 只更新 chapter_index
pub struct ReorderSegmentsHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
}

impl ReorderSegmentsHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
        }
    }

    pub async fn handle(&self, command: ReorderSegments) -> Result<(), ApplicationError> {
        ensure_job(&self.job_repo, command.job_id).await?;

        self.segment_repo
            .reorder(command.job_id, &command.ordered_ids)
            .await
            .map_err(|e| ApplicationError::from_repository(e, review_ctx(command.job_id)))?;

        tracing::debug!(
            job_id = %command.job_id,
            segments = command.ordered_ids.len(),
            "Segments reordered"
        );
        Ok(())
    }
}

// ============================================================================
// SetSegmentType
// ============================================================================

/// SetSegmentType Handler - 类型变更触发重新分配
///
/// 片头、片尾、试听样章由系统维护，不能改入或改出。
pub struct SetSegmentTypeHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
}

impl SetSegmentTypeHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
        }
    }

    pub async fn handle(&self, command: SetSegmentType) -> Result<SegmentRecord, ApplicationError> {
        let ctx = review_ctx(command.job_id).with_segment(command.segment_id);
        ensure_job(&self.job_repo, command.job_id).await?;

        if is_system_managed(command.segment_type) {
            return Err(ApplicationError::validation(
                ctx,
                format!("segment type {} is managed by the system", command.segment_type),
            ));
        }

        let segment = self
            .segment_repo
            .find_by_id(command.segment_id)
            .await?
            .filter(|s| s.job_id == command.job_id)
            .ok_or_else(|| ApplicationError::not_found("Segment", command.segment_id))?;

        if is_system_managed(segment.slot.segment_type()) {
            return Err(ApplicationError::validation(
                ctx,
                format!(
                    "segment type {} is managed by the system",
                    segment.slot.segment_type()
                ),
            ));
        }

        let updated = self
            .segment_repo
            .change_type(command.job_id, command.segment_id, command.segment_type)
            .await
            .map_err(|e| ApplicationError::from_repository(e, ctx))?;

        tracing::info!(
            job_id = %command.job_id,
            segment_id = %command.segment_id,
            from = %segment.slot.segment_type(),
            to = %command.segment_type,
            order = updated.slot.order(),
            "Segment type changed"
        );
        Ok(updated)
    }
}

fn is_system_managed(segment_type: SegmentType) -> bool {
    segment_type.is_credits() || segment_type == SegmentType::RetailSample
}

// ============================================================================
// SetSegmentIncluded
// ============================================================================

/// SetSegmentIncluded Handler - 纳入/排除
///
/// 片头、片尾、试听样章不能排除。
pub struct SetSegmentIncludedHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
}

impl SetSegmentIncludedHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
        }
    }

    pub async fn handle(
        &self,
        command: SetSegmentIncluded,
    ) -> Result<SegmentRecord, ApplicationError> {
        let ctx = review_ctx(command.job_id).with_segment(command.segment_id);
        ensure_job(&self.job_repo, command.job_id).await?;

        let segment = self
            .segment_repo
            .find_by_id(command.segment_id)
            .await?
            .filter(|s| s.job_id == command.job_id)
            .ok_or_else(|| ApplicationError::not_found("Segment", command.segment_id))?;

        if !command.included && is_system_managed(segment.slot.segment_type()) {
            return Err(ApplicationError::validation(
                ctx,
                format!("{} cannot be excluded", segment.slot.segment_type()),
            ));
        }

        let updated = self
            .segment_repo
            .set_included(command.job_id, command.segment_id, command.included)
            .await
            .map_err(|e| ApplicationError::from_repository(e, ctx))?;

        tracing::debug!(
            job_id = %command.job_id,
            segment_id = %command.segment_id,
            included = command.included,
            "Segment inclusion changed"
        );
        Ok(updated)
    }
}

// ============================================================================
// ApproveChapters
// ============================================================================

/// ApproveChapters Handler - chapters_pending -> chapters_approved 并入队合成
///
/// 没有未排除的正文章节或还没有确认试听样章时拒绝，Job 保持 chapters_pending。
pub struct ApproveChaptersHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    queue: Arc<dyn JobQueuePort>,
}

impl ApproveChaptersHandler {
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

    pub async fn handle(&self, command: ApproveChapters) -> Result<ApprovalSummary, ApplicationError> {
        let job_id = command.job_id;
        let ctx = review_ctx(job_id);
        ensure_job(&self.job_repo, job_id).await?;

        let summary = self
            .segment_repo
            .approve(job_id, command.segment_ids.as_deref())
            .await
            .map_err(|e| ApplicationError::from_repository(e, ctx))?;

        self.queue
            .enqueue(WorkItem::new(job_id, WorkStage::Synthesize))
            .await?;

        tracing::info!(
            job_id = %job_id,
            approved = summary.approved,
            excluded = summary.excluded,
            already_completed = summary.already_completed,
            "Chapters approved"
        );
        Ok(summary)
    }
}
