//! 测试装配：内存 SQLite + 临时目录中的 sled 队列和文件存储

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use crate::application::commands::handlers::{
    ApproveChaptersHandler, CancelJobHandler, ConfirmRetailSampleHandler,
    IngestManuscriptHandler, JobDefaults, ParseJobHandler, RetryJobHandler,
};
use crate::application::commands::{
    ApproveChapters, ConfirmRetailSample, IngestManuscript, ParseJob,
};
use crate::application::ports::{
    JobQueuePort, JobRecord, JobRepositoryPort, ObjectStoragePort, RetailSampleRecord,
    RetailSampleRepositoryPort, SegmentRecord, SegmentRepositoryPort, TrackRepositoryPort,
};
use crate::domain::retail_sample::{ExcerptScores, SampleMode};
use crate::domain::{ChunkLimits, DetectionMode, SegmentType};
use crate::infrastructure::adapters::{
    FakeTtsClient, FileObjectStorage, PresignConfig, WavProcessor,
};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
    SqliteRetailSampleRepository, SqliteSegmentRepository, SqliteTrackRepository,
};
use crate::infrastructure::persistence::SledJobQueue;
use crate::infrastructure::worker::{JobWorker, JobWorkerConfig, RetryPolicy};

pub(crate) const MANUSCRIPT: &str = "Prologue\nThe storm came over the hills.\n\n\
Chapter 1\nOne text here. The road was long.\n\n\
Chapter 2\nTwo text here. \"Wait!\" she said.\n\n\
Chapter 3\nThree text here. They arrived at last.";

/// 每章若干句、带对白的较长稿件，用于样章选择
pub(crate) fn long_manuscript(chapters: usize) -> String {
    let mut text = String::new();
    for i in 1..=chapters {
        text.push_str(&format!("Chapter {}\n", i));
        for j in 1..=6 {
            text.push_str(&format!(
                "The travellers walked along the river in part {} of day {}. \"Are we close?\" she asked with hope. ",
                j, i
            ));
        }
        text.push_str("\n\n");
    }
    text
}

pub(crate) struct Harness {
    _dir: TempDir,
    pub jobs: Arc<dyn JobRepositoryPort>,
    pub segments: Arc<dyn SegmentRepositoryPort>,
    pub tracks: Arc<dyn TrackRepositoryPort>,
    pub samples: Arc<dyn RetailSampleRepositoryPort>,
    pub storage: Arc<dyn ObjectStoragePort>,
    pub queue: Arc<dyn JobQueuePort>,
    pub events: Arc<EventPublisher>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let storage = FileObjectStorage::new(
            dir.path().join("objects"),
            PresignConfig {
                base_url: "http://files.local".to_string(),
                secret: "test-secret".to_string(),
            },
        )
        .await
        .unwrap();
        let queue = SledJobQueue::open(dir.path().join("queue")).unwrap();

        Self {
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            segments: Arc::new(SqliteSegmentRepository::new(pool.clone())),
            tracks: Arc::new(SqliteTrackRepository::new(pool.clone())),
            samples: Arc::new(SqliteRetailSampleRepository::new(pool)),
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            events: EventPublisher::new().arc(),
            _dir: dir,
        }
    }

    pub fn defaults() -> JobDefaults {
        JobDefaults {
            voice_id: "narrator-1".to_string(),
            detection_mode: DetectionMode::Standard,
            sample_mode: SampleMode::Standard,
        }
    }

    pub async fn ingest(&self, manuscript: &str) -> Uuid {
        IngestManuscriptHandler::new(
            self.jobs.clone(),
            self.storage.clone(),
            self.queue.clone(),
            Self::defaults(),
        )
        .handle(IngestManuscript {
            title: "The Long Road".to_string(),
            author: Some("A. Writer".to_string()),
            narrator: Some("N. Voice".to_string()),
            voice_id: None,
            detection_mode: None,
            sample_mode: None,
            manuscript_text: manuscript.to_string(),
        })
        .await
        .unwrap()
        .job_id
    }

    pub async fn parse(&self, job_id: Uuid) -> Vec<SegmentRecord> {
        ParseJobHandler::new(self.jobs.clone(), self.segments.clone(), self.storage.clone())
            .handle(ParseJob { job_id })
            .await
            .unwrap()
    }

    /// 以第一个正文章节为唯一候选并确认，返回 order 99 的样章片段
    pub async fn confirm_sample(&self, job_id: Uuid) -> SegmentRecord {
        let source = self
            .segments(job_id)
            .await
            .into_iter()
            .find(|s| s.slot.segment_type() == SegmentType::BodyChapter)
            .unwrap();
        let candidate = RetailSampleRecord {
            id: Uuid::new_v4(),
            job_id,
            segment_id: source.id,
            segment_order: source.slot.order(),
            start_offset: 0,
            end_offset: source.text.len() as u32,
            text: source.text.clone(),
            edited_text: None,
            word_count: source.word_count,
            scores: ExcerptScores {
                engagement: 0.7,
                emotional_intensity: 0.5,
                spoiler_risk: 0.1,
                romantic_tension: 0.0,
            },
            overall_score: 0.7,
            mode: SampleMode::Standard,
            rank: 1,
            is_final: false,
            created_at: Utc::now(),
            confirmed_at: None,
        };
        self.samples
            .replace_candidates(job_id, &[candidate.clone()])
            .await
            .unwrap();

        ConfirmRetailSampleHandler::new(self.jobs.clone(), self.samples.clone())
            .handle(ConfirmRetailSample {
                job_id,
                sample_id: candidate.id,
                edited_text: None,
            })
            .await
            .unwrap()
            .segment
    }

    /// 确认样章后审批全部片段
    pub async fn approve(&self, job_id: Uuid) {
        self.confirm_sample(job_id).await;
        ApproveChaptersHandler::new(self.jobs.clone(), self.segments.clone(), self.queue.clone())
            .handle(ApproveChapters {
                job_id,
                segment_ids: None,
            })
            .await
            .unwrap();
    }

    pub fn cancel_handler(&self) -> CancelJobHandler {
        CancelJobHandler::new(self.jobs.clone())
    }

    pub fn retry_handler(&self) -> RetryJobHandler {
        RetryJobHandler::new(self.jobs.clone(), self.segments.clone(), self.queue.clone())
    }

    pub async fn job(&self, job_id: Uuid) -> JobRecord {
        self.jobs.find_by_id(job_id).await.unwrap().unwrap()
    }

    pub async fn segments(&self, job_id: Uuid) -> Vec<SegmentRecord> {
        self.segments.find_by_job(job_id).await.unwrap()
    }

    /// 重试间隔缩短到毫秒级，其余与默认一致
    pub fn worker_config(max_concurrent_segments: usize) -> JobWorkerConfig {
        JobWorkerConfig {
            max_concurrent_segments,
            poll_interval: Duration::from_millis(20),
            chunk_limits: ChunkLimits::default(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                max_retries: 3,
            },
        }
    }

    pub fn worker(&self, tts: Arc<FakeTtsClient>, config: JobWorkerConfig) -> JobWorker {
        JobWorker::new(
            config,
            self.queue.clone(),
            self.jobs.clone(),
            self.segments.clone(),
            self.tracks.clone(),
            self.storage.clone(),
            tts,
            Arc::new(WavProcessor::new()),
            self.events.clone(),
        )
    }
}
