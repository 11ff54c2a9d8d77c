//! Job Query Handlers

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::application::error::{ApplicationError, UserFacingError};
use crate::application::ports::{
    JobRecord, JobRepositoryPort, ObjectStoragePort, RetailSampleRecord,
    RetailSampleRepositoryPort, SegmentRecord, SegmentRepositoryPort,
};
use crate::application::queries::{GetJob, GetOrderedSegments, ListRetailSamples};
use crate::domain::{JobStatus, SegmentStatus, SegmentType};

// ============================================================================
// Response DTOs
// ============================================================================

/// Job 详情响应
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub voice_id: String,
    pub status: JobStatus,
    pub segment_count: u32,
    pub track_count: u32,
    /// 只有分类、引用号和处理建议
    pub failure: Option<UserFacingError>,
    /// 完成后的清单访问地址
    pub manifest_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 有序片段响应
#[derive(Debug, Clone)]
pub struct OrderedSegment {
    pub id: Uuid,
    pub segment_type: SegmentType,
    pub segment_order: u8,
    pub filename: String,
    pub title: String,
    pub source_order: i64,
    pub chapter_index: i64,
    pub status: SegmentStatus,
    pub word_count: u32,
    pub char_count: u32,
}

impl OrderedSegment {
    fn from_record(record: SegmentRecord, ext: &str) -> Self {
        Self {
            id: record.id,
            segment_type: record.slot.segment_type(),
            segment_order: record.slot.order(),
            filename: record.filename(ext),
            title: record.title,
            source_order: record.source_order,
            chapter_index: record.chapter_index,
            status: record.status,
            word_count: record.word_count,
            char_count: record.char_count,
        }
    }
}

async fn load_job(
    job_repo: &Arc<dyn JobRepositoryPort>,
    job_id: Uuid,
) -> Result<JobRecord, ApplicationError> {
    job_repo
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Job", job_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// GetJob Handler
pub struct GetJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    storage: Arc<dyn ObjectStoragePort>,
    presign_ttl: Duration,
}

impl GetJobHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        storage: Arc<dyn ObjectStoragePort>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            job_repo,
            storage,
            presign_ttl,
        }
    }

    pub async fn handle(&self, query: GetJob) -> Result<JobView, ApplicationError> {
        let job = load_job(&self.job_repo, query.job_id).await?;

        let manifest_url = match (&job.manifest_key, job.status) {
            (Some(key), JobStatus::Completed) => Some(self.storage.presign(key, self.presign_ttl)?),
            _ => None,
        };

        Ok(JobView {
            id: job.id,
            title: job.title,
            author: job.author,
            narrator: job.narrator,
            voice_id: job.voice_id,
            status: job.status,
            segment_count: job.segment_count,
            track_count: job.track_count,
            failure: job.failure.map(|f| UserFacingError {
                classification: f.classification,
                reference: f.reference,
                guidance: f.guidance,
            }),
            manifest_url,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        })
    }
}

/// GetOrderedSegments Handler
pub struct GetOrderedSegmentsHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    audio_extension: String,
}

impl GetOrderedSegmentsHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        audio_extension: impl Into<String>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
            audio_extension: audio_extension.into(),
        }
    }

    pub async fn handle(
        &self,
        query: GetOrderedSegments,
    ) -> Result<Vec<OrderedSegment>, ApplicationError> {
        load_job(&self.job_repo, query.job_id).await?;

        let mut segments = self.segment_repo.find_by_job(query.job_id).await?;
        segments.sort_by_key(|s| s.slot.order());

        Ok(segments
            .into_iter()
            .map(|s| OrderedSegment::from_record(s, &self.audio_extension))
            .collect())
    }
}

/// ListRetailSamples Handler
pub struct ListRetailSamplesHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    sample_repo: Arc<dyn RetailSampleRepositoryPort>,
}

impl ListRetailSamplesHandler {
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
        query: ListRetailSamples,
    ) -> Result<Vec<RetailSampleRecord>, ApplicationError> {
        load_job(&self.job_repo, query.job_id).await?;
        Ok(self.sample_repo.find_by_job(query.job_id).await?)
    }
}
