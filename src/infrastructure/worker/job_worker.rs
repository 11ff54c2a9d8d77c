//! Job Worker - 后台流水线
//!
//! 从持久化队列领取工作项，按阶段执行：
//! - Parse: 切分稿件，Job 进入待审核
//! - Synthesize: 并发合成片段，全部完成后组装
//!
//! 重新领取一个已经处于 parsing/processing 的 Job 会从断点继续，
//! 已完成的片段不会再次合成。

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::retry::{run_with_retry, RetryPolicy};
use crate::application::commands::handlers::{AssembleJobHandler, ParseJobHandler};
use crate::application::commands::{AssembleJob, ParseJob};
use crate::application::error::{ApplicationError, ErrorContext};
use crate::application::ports::{
    keys, AudioProcessorPort, JobQueuePort, JobRecord, JobRepositoryPort, ObjectStoragePort,
    SegmentAudio, SegmentRecord, SegmentRepositoryPort, SynthesisRequest, TrackRepositoryPort,
    TtsEnginePort, TtsError, WorkItem, WorkStage,
};
use crate::domain::{chunk_text, ChunkLimits, JobStatus, Phase, SegmentStatus};
use crate::infrastructure::events::EventPublisher;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// 单个 Job 内同时合成的片段数
    pub max_concurrent_segments: usize,
    /// 队列为空时的轮询间隔
    pub poll_interval: Duration,
    pub chunk_limits: ChunkLimits,
    pub retry: RetryPolicy,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_segments: 4,
            poll_interval: Duration::from_secs(2),
            chunk_limits: ChunkLimits::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// 一个工作项的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// 切分完成，等待人工审核
    AwaitingReview,
    Completed,
    Failed,
    /// Job 已被用户取消
    Cancelled,
    /// Job 状态不适合该阶段，工作项被丢弃
    Skipped,
    /// 进程关闭打断了处理，工作项保留在 in-flight 中等待恢复
    Interrupted,
}

enum SegmentOutcome {
    Completed,
    Skipped,
    Cancelled,
    Failed(ApplicationError),
}

/// 后台 Worker
pub struct JobWorker {
    config: JobWorkerConfig,
    queue: Arc<dyn JobQueuePort>,
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    storage: Arc<dyn ObjectStoragePort>,
    tts_engine: Arc<dyn TtsEnginePort>,
    audio: Arc<dyn AudioProcessorPort>,
    event_publisher: Arc<EventPublisher>,
    parse_handler: ParseJobHandler,
    assemble_handler: AssembleJobHandler,
}

/// 需要朗读标题的片段把标题作为第一句
fn spoken_text(segment: &SegmentRecord) -> String {
    let title = segment.title.trim();
    if !segment.slot.segment_type().announces_title() || title.is_empty() {
        return segment.text.clone();
    }

    if title.ends_with(['.', '!', '?']) {
        format!("{}\n\n{}", title, segment.text)
    } else {
        format!("{}.\n\n{}", title, segment.text)
    }
}

impl JobWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: JobWorkerConfig,
        queue: Arc<dyn JobQueuePort>,
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        track_repo: Arc<dyn TrackRepositoryPort>,
        storage: Arc<dyn ObjectStoragePort>,
        tts_engine: Arc<dyn TtsEnginePort>,
        audio: Arc<dyn AudioProcessorPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        let parse_handler =
            ParseJobHandler::new(job_repo.clone(), segment_repo.clone(), storage.clone());
        let assemble_handler = AssembleJobHandler::new(
            job_repo.clone(),
            segment_repo.clone(),
            track_repo,
            storage.clone(),
            audio.extension(),
        );

        Self {
            config,
            queue,
            job_repo,
            segment_repo,
            storage,
            tts_engine,
            audio,
            event_publisher,
            parse_handler,
            assemble_handler,
        }
    }

    /// 启动 Worker，直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        match self.queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(recovered) => tracing::warn!(recovered, "Recovered unacknowledged work items"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight work items"),
        }

        tracing::info!(
            max_concurrent_segments = self.config.max_concurrent_segments,
            queued = self.queue.len(),
            "JobWorker started"
        );

        while !shutdown.is_cancelled() {
            match self.run_once(&shutdown).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.queue.wait_for_work() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue operation failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("JobWorker stopped");
    }

    /// 领取并处理一个工作项；队列为空时返回 None
    pub async fn run_once(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<StageOutcome>, ApplicationError> {
        let Some(item) = self.queue.claim().await? else {
            return Ok(None);
        };

        tracing::info!(
            job_id = %item.job_id,
            item_id = %item.id,
            stage = item.stage.as_str(),
            "Work item claimed"
        );

        let outcome = self.process(&item, shutdown).await;

        if outcome == StageOutcome::Interrupted {
            tracing::info!(
                job_id = %item.job_id,
                item_id = %item.id,
                "Work item left in flight for recovery"
            );
        } else {
            self.queue.ack(item.id).await?;
        }

        Ok(Some(outcome))
    }

    async fn process(&self, item: &WorkItem, shutdown: &CancellationToken) -> StageOutcome {
        let (result, phase) = match item.stage {
            WorkStage::Parse => (self.parse_stage(item.job_id).await, Phase::Parsing),
            WorkStage::Synthesize => (
                self.synthesize_stage(item.job_id, shutdown).await,
                Phase::Synthesis,
            ),
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let from = match item.stage {
                    WorkStage::Parse => [JobStatus::Parsing],
                    WorkStage::Synthesize => [JobStatus::Processing],
                };
                self.fail_job(item.job_id, &from, &err, phase).await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Parse
    // ------------------------------------------------------------------------

    async fn parse_stage(&self, job_id: Uuid) -> Result<StageOutcome, ApplicationError> {
        match self.parse_handler.handle(ParseJob { job_id }).await {
            Ok(segments) => {
                tracing::debug!(job_id = %job_id, segments = segments.len(), "Parse stage done");
                self.event_publisher
                    .publish_job_status(job_id, JobStatus::ChaptersPending, None);
                Ok(StageOutcome::AwaitingReview)
            }
            Err(ApplicationError::InvalidState { message, .. }) => {
                tracing::info!(job_id = %job_id, reason = %message, "Parse skipped");
                Ok(StageOutcome::Skipped)
            }
            Err(ApplicationError::NotFound { .. }) => {
                tracing::warn!(job_id = %job_id, "Parse skipped, job no longer exists");
                Ok(StageOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------------
    // Synthesize
    // ------------------------------------------------------------------------

    async fn synthesize_stage(
        &self,
        job_id: Uuid,
        shutdown: &CancellationToken,
    ) -> Result<StageOutcome, ApplicationError> {
        let Some(job) = self.job_repo.find_by_id(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Synthesis skipped, job no longer exists");
            return Ok(StageOutcome::Skipped);
        };

        let claimed = self
            .job_repo
            .transition(
                job_id,
                &[JobStatus::ChaptersApproved, JobStatus::Processing],
                JobStatus::Processing,
            )
            .await?;
        if !claimed {
            tracing::info!(job_id = %job_id, status = %job.status, "Synthesis skipped");
            return Ok(StageOutcome::Skipped);
        }
        if job.status != JobStatus::Processing {
            self.event_publisher
                .publish_job_status(job_id, JobStatus::Processing, None);
        }

        let pending: Vec<SegmentRecord> = self
            .segment_repo
            .find_by_job(job_id)
            .await?
            .into_iter()
            .filter(|s| matches!(s.status, SegmentStatus::Approved | SegmentStatus::Processing))
            .collect();

        tracing::info!(
            job_id = %job_id,
            pending = pending.len(),
            resumed = job.status == JobStatus::Processing,
            "Synthesis started"
        );

        let job_token = shutdown.child_token();
        let outcomes: Vec<SegmentOutcome> = stream::iter(pending)
            .map(|segment| self.synthesize_segment(&job, segment, &job_token))
            .buffer_unordered(self.config.max_concurrent_segments.max(1))
            .collect()
            .await;

        let failure = outcomes.into_iter().find_map(|outcome| match outcome {
            SegmentOutcome::Failed(err) => Some(err),
            _ => None,
        });

        if let Some(err) = failure {
            self.segment_repo.release_processing(job_id).await?;
            return Ok(self
                .fail_job(job_id, &[JobStatus::Processing], &err, Phase::Synthesis)
                .await);
        }

        if shutdown.is_cancelled() {
            let released = self.segment_repo.release_processing(job_id).await?;
            tracing::info!(job_id = %job_id, released, "Synthesis interrupted by shutdown");
            return Ok(StageOutcome::Interrupted);
        }

        if job_token.is_cancelled() || !self.job_is_processing(job_id).await? {
            let released = self.segment_repo.release_processing(job_id).await?;
            tracing::info!(job_id = %job_id, released, "Synthesis stopped, job cancelled");
            return Ok(StageOutcome::Cancelled);
        }

        match self.assemble_handler.handle(AssembleJob { job_id }).await {
            Ok(manifest) => {
                self.event_publisher.publish_job_assembled(
                    job_id,
                    manifest.track_count as u32,
                    manifest.total_duration_ms,
                );
                self.event_publisher
                    .publish_job_status(job_id, JobStatus::Completed, None);
                Ok(StageOutcome::Completed)
            }
            Err(err) => Ok(self
                .fail_job(job_id, &[JobStatus::Processing], &err, Phase::Assembly)
                .await),
        }
    }

    async fn job_is_processing(&self, job_id: Uuid) -> Result<bool, ApplicationError> {
        Ok(self
            .job_repo
            .find_by_id(job_id)
            .await?
            .is_some_and(|job| job.status == JobStatus::Processing))
    }

    /// 合成单个片段；失败时标记片段失败并取消同一 Job 的其他片段
    ///
    /// 返回装箱的 `Send` future，`run` 可以直接交给 `tokio::spawn`。
    fn synthesize_segment<'a>(
        &'a self,
        job: &'a JobRecord,
        segment: SegmentRecord,
        job_token: &'a CancellationToken,
    ) -> BoxFuture<'a, SegmentOutcome> {
        async move {
            let mut attempts = 0;
            match self
                .render_segment(job, &segment, job_token, &mut attempts)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    job_token.cancel();
                    tracing::error!(
                        job_id = %job.id,
                        segment_id = %segment.id,
                        attempts,
                        reference = %err.reference(),
                        error = %err,
                        "Segment synthesis failed"
                    );

                    if let Err(e) = self
                        .segment_repo
                        .mark_failed(segment.id, &err.to_string(), attempts)
                        .await
                    {
                        tracing::error!(segment_id = %segment.id, error = %e, "Failed to mark segment failed");
                    }
                    self.event_publisher.publish_segment_status(
                        job.id,
                        segment.id,
                        SegmentStatus::Failed,
                        None,
                    );
                    SegmentOutcome::Failed(err)
                }
            }
        }
        .boxed()
    }

    async fn render_segment(
        &self,
        job: &JobRecord,
        segment: &SegmentRecord,
        job_token: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<SegmentOutcome, ApplicationError> {
        let ctx = ErrorContext::new(job.id, Phase::Synthesis).with_segment(segment.id);

        if job_token.is_cancelled() {
            return Ok(SegmentOutcome::Cancelled);
        }
        if !self.job_is_processing(job.id).await? {
            job_token.cancel();
            return Ok(SegmentOutcome::Cancelled);
        }
        if !self.segment_repo.mark_processing(segment.id).await? {
            tracing::debug!(segment_id = %segment.id, "Segment no longer approved, skipping");
            return Ok(SegmentOutcome::Skipped);
        }
        self.event_publisher.publish_segment_status(
            job.id,
            segment.id,
            SegmentStatus::Processing,
            None,
        );

        let chunks = chunk_text(&spoken_text(segment), &self.config.chunk_limits);
        let mut parts = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let result = run_with_retry(
                &self.config.retry,
                job_token,
                |_| {
                    self.tts_engine.synthesize(SynthesisRequest {
                        text: chunk.text.clone(),
                        voice_id: job.voice_id.clone(),
                    })
                },
                |e: &TtsError| e.is_transient(),
                |attempt, e, delay| {
                    tracing::warn!(
                        job_id = %job.id,
                        segment_id = %segment.id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Transient synthesis error, backing off"
                    );
                    self.event_publisher.publish_retry_scheduled(
                        job.id,
                        segment.id,
                        attempt,
                        delay.as_secs(),
                        &e.to_string(),
                    );
                },
            )
            .await;

            match result {
                Ok((audio, used)) => {
                    *attempts = (*attempts).max(used);
                    parts.push(audio.audio_data);
                }
                Err(terminal) if terminal.cancelled => return Ok(SegmentOutcome::Cancelled),
                Err(terminal) => {
                    *attempts = (*attempts).max(terminal.attempts);
                    return Err(ApplicationError::from_retry_terminal(
                        terminal.first_error,
                        terminal.error,
                        terminal.attempts,
                        ctx,
                    ));
                }
            }
        }

        let merged = self
            .audio
            .merge(&parts)
            .map_err(|e| ApplicationError::PermanentSynthesis {
                context: ctx,
                message: format!("audio merge failed: {}", e),
            })?;

        if job_token.is_cancelled() {
            return Ok(SegmentOutcome::Cancelled);
        }
        if !self.job_is_processing(job.id).await? {
            job_token.cancel();
            return Ok(SegmentOutcome::Cancelled);
        }

        let audio_key = keys::segment_audio(job.id, segment.id, self.audio.extension());
        self.storage.put(&audio_key, &merged.data).await?;

        let audio = SegmentAudio {
            audio_key,
            duration_ms: merged.info.duration_ms,
            size_bytes: merged.data.len() as u64,
        };
        self.segment_repo
            .mark_completed(segment.id, &audio, *attempts)
            .await?;

        tracing::info!(
            job_id = %job.id,
            segment_id = %segment.id,
            title = %segment.title,
            chunks = chunks.len(),
            attempts = *attempts,
            duration_ms = audio.duration_ms,
            "Segment synthesized"
        );
        self.event_publisher.publish_segment_status(
            job.id,
            segment.id,
            SegmentStatus::Completed,
            Some(audio.duration_ms),
        );

        Ok(SegmentOutcome::Completed)
    }

    /// 记录 Job 失败；Job 已离开 `from` 时按当前状态给出结果
    async fn fail_job(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        err: &ApplicationError,
        phase: Phase,
    ) -> StageOutcome {
        let failure = err.to_failure(phase);

        match self.job_repo.mark_failed(job_id, from, &failure).await {
            Ok(true) => {
                tracing::error!(
                    job_id = %job_id,
                    phase = %failure.phase,
                    classification = %failure.classification,
                    reference = %failure.reference,
                    error = %err,
                    "Job failed"
                );
                self.event_publisher.publish_job_status(
                    job_id,
                    JobStatus::Failed,
                    Some(&failure.reference),
                );
                StageOutcome::Failed
            }
            Ok(false) => match self.job_repo.find_by_id(job_id).await {
                Ok(Some(job)) if job.status == JobStatus::Failed => {
                    let reference = job.failure.as_ref().map(|f| f.reference.as_str());
                    self.event_publisher
                        .publish_job_status(job_id, JobStatus::Failed, reference);
                    StageOutcome::Failed
                }
                Ok(Some(job)) if job.status == JobStatus::Cancelled => {
                    tracing::info!(job_id = %job_id, error = %err, "Job cancelled before failure was recorded");
                    StageOutcome::Cancelled
                }
                Ok(job) => {
                    tracing::warn!(
                        job_id = %job_id,
                        status = ?job.map(|j| j.status),
                        error = %err,
                        "Stage failed but job state moved on"
                    );
                    StageOutcome::Skipped
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to reload job");
                    StageOutcome::Failed
                }
            },
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    reference = %failure.reference,
                    error = %e,
                    "Failed to record job failure"
                );
                StageOutcome::Failed
            }
        }
    }
}
