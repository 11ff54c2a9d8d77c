//! Retail Sample Command Handlers - 试听样章

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::commands::{ConfirmRetailSample, SelectRetailSample};
use crate::application::error::{ApplicationError, ErrorContext};
use crate::application::ports::{
    ExcerptScorerPort, JobRecord, JobRepositoryPort, RetailSampleRecord,
    RetailSampleRepositoryPort, SegmentRecord, SegmentRepositoryPort,
};
use crate::domain::retail_sample::{excerpt_windows, rank, ScoredExcerpt, WindowConfig};
use crate::domain::{JobStatus, Phase, SegmentStatus, SegmentType};

/// 样章片段标题
pub const RETAIL_SAMPLE_TITLE: &str = "Retail Sample";

async fn load_reviewable_job(
    job_repo: &Arc<dyn JobRepositoryPort>,
    job_id: Uuid,
) -> Result<JobRecord, ApplicationError> {
    let job = job_repo
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

    if job.status != JobStatus::ChaptersPending {
        return Err(ApplicationError::invalid_state(
            ErrorContext::new(job_id, Phase::Review),
            format!("job is {}, retail sample requires chapters_pending", job.status),
        ));
    }
    Ok(job)
}

// ============================================================================
// SelectRetailSample
// ============================================================================

/// SelectRetailSample Handler - 生成并排序候选
pub struct SelectRetailSampleHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    sample_repo: Arc<dyn RetailSampleRepositoryPort>,
    scorer: Arc<dyn ExcerptScorerPort>,
    window: WindowConfig,
}

impl SelectRetailSampleHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        sample_repo: Arc<dyn RetailSampleRepositoryPort>,
        scorer: Arc<dyn ExcerptScorerPort>,
        window: WindowConfig,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
            sample_repo,
            scorer,
            window,
        }
    }

    pub async fn handle(
        &self,
        command: SelectRetailSample,
    ) -> Result<Vec<RetailSampleRecord>, ApplicationError> {
        let job = load_reviewable_job(&self.job_repo, command.job_id).await?;

        // 只看前 N 个内容片段，限制剧透范围
        let mut sources: Vec<SegmentRecord> = self
            .segment_repo
            .find_by_job(job.id)
            .await?
            .into_iter()
            .filter(|s| {
                let ty = s.slot.segment_type();
                !ty.is_credits()
                    && ty != SegmentType::RetailSample
                    && s.status != SegmentStatus::Excluded
            })
            .collect();
        sources.sort_by_key(|s| (s.chapter_index, s.source_order));
        sources.truncate(self.window.segment_limit);

        let mut scored = Vec::new();
        for segment in &sources {
            for window in excerpt_windows(segment.id, segment.slot.order(), &segment.text, &self.window)
            {
                let scores = self.scorer.score(&window.text).await.map_err(|e| {
                    ApplicationError::internal(format!("excerpt scoring failed: {}", e))
                })?;
                scored.push(ScoredExcerpt::new(window, scores, job.sample_mode));
            }
        }
        rank(&mut scored);

        if scored.is_empty() {
            tracing::warn!(
                job_id = %job.id,
                segments = sources.len(),
                min_words = self.window.min_words,
                "No excerpt window long enough for a retail sample"
            );
        }

        let now = Utc::now();
        let records: Vec<RetailSampleRecord> = scored
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| RetailSampleRecord {
                id: Uuid::new_v4(),
                job_id: job.id,
                segment_id: candidate.window.segment_id,
                segment_order: candidate.window.segment_order,
                start_offset: candidate.window.start as u32,
                end_offset: candidate.window.end as u32,
                word_count: candidate.window.word_count as u32,
                text: candidate.window.text,
                edited_text: None,
                scores: candidate.scores,
                overall_score: candidate.overall,
                mode: job.sample_mode,
                rank: i as u32 + 1,
                is_final: false,
                created_at: now,
                confirmed_at: None,
            })
            .collect();

        self.sample_repo.replace_candidates(job.id, &records).await?;

        tracing::info!(
            job_id = %job.id,
            candidates = records.len(),
            mode = job.sample_mode.as_str(),
            "Retail sample candidates selected"
        );
        Ok(records)
    }
}

// ============================================================================
// ConfirmRetailSample
// ============================================================================

/// 确认结果
#[derive(Debug, Clone)]
pub struct ConfirmedSample {
    pub sample: RetailSampleRecord,
    /// order 99 的样章片段
    pub segment: SegmentRecord,
}

/// ConfirmRetailSample Handler - 标记最终样章并写入样章片段
///
/// 两步在仓储的同一事务内完成，与审批互斥。
pub struct ConfirmRetailSampleHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    sample_repo: Arc<dyn RetailSampleRepositoryPort>,
}

impl ConfirmRetailSampleHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        sample_repo: Arc<dyn RetailSampleRepositoryPort>,
    ) -> Self {
        Self {
            job_repo,
            sample_repo,
        }
    }

    pub async fn handle(
        &self,
        command: ConfirmRetailSample,
    ) -> Result<ConfirmedSample, ApplicationError> {
        let job = load_reviewable_job(&self.job_repo, command.job_id).await?;
        let ctx = ErrorContext::new(job.id, Phase::Review);

        if let Some(edited) = &command.edited_text {
            if edited.trim().is_empty() {
                return Err(ApplicationError::validation(ctx, "edited text must not be empty"));
            }
        }

        let (sample, segment) = self
            .sample_repo
            .confirm(
                job.id,
                command.sample_id,
                command.edited_text.as_deref(),
                RETAIL_SAMPLE_TITLE,
            )
            .await
            .map_err(|e| ApplicationError::from_repository(e, ctx))?;

        tracing::info!(
            job_id = %job.id,
            sample_id = %sample.id,
            edited = sample.edited_text.is_some(),
            segment_id = %segment.id,
            "Retail sample confirmed"
        );
        Ok(ConfirmedSample { sample, segment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::KeywordScorer;
    use crate::infrastructure::testing::{long_manuscript, Harness, MANUSCRIPT};

    fn window() -> WindowConfig {
        WindowConfig {
            segment_limit: 3,
            min_words: 20,
            max_words: 60,
        }
    }

    fn select_handler(harness: &Harness) -> SelectRetailSampleHandler {
        SelectRetailSampleHandler::new(
            harness.jobs.clone(),
            harness.segments.clone(),
            harness.samples.clone(),
            Arc::new(KeywordScorer::default()),
            window(),
        )
    }

    fn confirm_handler(harness: &Harness) -> ConfirmRetailSampleHandler {
        ConfirmRetailSampleHandler::new(harness.jobs.clone(), harness.samples.clone())
    }

    #[tokio::test]
    async fn test_select_ranks_windows_from_leading_chapters() {
        let harness = Harness::new().await;
        let job_id = harness.ingest(&long_manuscript(5)).await;
        let segments = harness.parse(job_id).await;
        let leading: Vec<Uuid> = segments[1..4].iter().map(|s| s.id).collect();

        let candidates = select_handler(&harness)
            .handle(SelectRetailSample { job_id })
            .await
            .unwrap();

        assert!(!candidates.is_empty());
        for (i, candidate) in candidates.iter().enumerate() {
            assert_eq!(candidate.rank, i as u32 + 1);
            assert!(leading.contains(&candidate.segment_id));
            assert!(candidate.word_count >= 20 && candidate.word_count <= 60);
            assert!(!candidate.is_final);
        }
        assert!(candidates
            .windows(2)
            .all(|pair| pair[0].overall_score >= pair[1].overall_score));
    }

    #[tokio::test]
    async fn test_confirm_writes_single_sample_segment() {
        let harness = Harness::new().await;
        let job_id = harness.ingest(&long_manuscript(3)).await;
        harness.parse(job_id).await;

        let candidates = select_handler(&harness)
            .handle(SelectRetailSample { job_id })
            .await
            .unwrap();
        assert!(candidates.len() >= 2);

        let first = confirm_handler(&harness)
            .handle(ConfirmRetailSample {
                job_id,
                sample_id: candidates[0].id,
                edited_text: Some("A shorter excerpt for the store page.".to_string()),
            })
            .await
            .unwrap();
        assert!(first.sample.is_final);
        assert_eq!(first.segment.slot.order(), 99);
        assert_eq!(first.segment.title, RETAIL_SAMPLE_TITLE);
        assert_eq!(first.segment.text, "A shorter excerpt for the store page.");

        let second = confirm_handler(&harness)
            .handle(ConfirmRetailSample {
                job_id,
                sample_id: candidates[1].id,
                edited_text: None,
            })
            .await
            .unwrap();
        assert_eq!(second.segment.id, first.segment.id);
        assert_eq!(second.segment.text, candidates[1].text);

        let samples: Vec<SegmentRecord> = harness
            .segments(job_id)
            .await
            .into_iter()
            .filter(|s| s.slot.segment_type() == SegmentType::RetailSample)
            .collect();
        assert_eq!(samples.len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_rejects_blank_edit_and_unknown_sample() {
        let harness = Harness::new().await;
        let job_id = harness.ingest(&long_manuscript(2)).await;
        harness.parse(job_id).await;
        let candidates = select_handler(&harness)
            .handle(SelectRetailSample { job_id })
            .await
            .unwrap();

        let err = confirm_handler(&harness)
            .handle(ConfirmRetailSample {
                job_id,
                sample_id: candidates[0].id,
                edited_text: Some("   ".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.classification(), "validation_error");

        let err = confirm_handler(&harness)
            .handle(ConfirmRetailSample {
                job_id,
                sample_id: Uuid::new_v4(),
                edited_text: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.classification(), "validation_error");
        assert!(harness
            .segments(job_id)
            .await
            .iter()
            .all(|s| s.slot.segment_type() != SegmentType::RetailSample));
    }

    #[tokio::test]
    async fn test_select_requires_chapters_pending() {
        let harness = Harness::new().await;
        let job_id = harness.ingest(MANUSCRIPT).await;

        let err = select_handler(&harness)
            .handle(SelectRetailSample { job_id })
            .await
            .unwrap_err();
        assert_eq!(err.classification(), "invalid_state");
    }
}
