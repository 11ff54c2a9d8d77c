//! Assemble Handler - 成品组装
//!
//! 所有未排除片段完成后执行：排定曲目、写入清单、processing -> completed。

use chrono::Utc;
use std::sync::Arc;

use crate::application::commands::AssembleJob;
use crate::application::error::{ApplicationError, ErrorContext};
use crate::application::ports::{
    keys, JobRepositoryPort, ObjectStoragePort, SegmentRepositoryPort, TrackRecord,
    TrackRepositoryPort,
};
use crate::domain::assembler::{build_manifest, order_tracks, Manifest, ManifestJob, TrackSource};
use crate::domain::{JobStatus, Phase};

pub struct AssembleJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    segment_repo: Arc<dyn SegmentRepositoryPort>,
    track_repo: Arc<dyn TrackRepositoryPort>,
    storage: Arc<dyn ObjectStoragePort>,
    audio_extension: String,
}

impl AssembleJobHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        segment_repo: Arc<dyn SegmentRepositoryPort>,
        track_repo: Arc<dyn TrackRepositoryPort>,
        storage: Arc<dyn ObjectStoragePort>,
        audio_extension: impl Into<String>,
    ) -> Self {
        Self {
            job_repo,
            segment_repo,
            track_repo,
            storage,
            audio_extension: audio_extension.into(),
        }
    }

    pub async fn handle(&self, command: AssembleJob) -> Result<Manifest, ApplicationError> {
        let job_id = command.job_id;
        let ctx = ErrorContext::new(job_id, Phase::Assembly);

        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;
        if job.status != JobStatus::Processing {
            return Err(ApplicationError::invalid_state(
                ctx,
                format!("job is {}, assembly requires processing", job.status),
            ));
        }

        let sources: Vec<TrackSource> = self
            .segment_repo
            .find_by_job(job_id)
            .await?
            .into_iter()
            .map(|s| TrackSource {
                segment_id: s.id,
                slot: s.slot,
                title: s.title,
                status: s.status,
                audio_key: s.audio_key,
                duration_ms: s.duration_ms,
                size_bytes: s.size_bytes,
            })
            .collect();

        let tracks = order_tracks(sources, &self.audio_extension)
            .map_err(|e| ApplicationError::from_domain(e, ctx))?;

        let manifest = build_manifest(
            ManifestJob {
                job_id,
                title: job.title.clone(),
                author: job.author.clone(),
                narrator: job.narrator.clone(),
                voice_id: job.voice_id.clone(),
            },
            &tracks,
            Utc::now(),
        );

        let manifest_key = keys::manifest(job_id);
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ApplicationError::internal(format!("manifest serialization: {}", e)))?;
        self.storage.put(&manifest_key, &body).await?;

        let now = Utc::now();
        let records: Vec<TrackRecord> = tracks
            .iter()
            .map(|t| TrackRecord {
                id: uuid::Uuid::new_v4(),
                job_id,
                segment_id: t.segment_id,
                position: t.position,
                slot: t.slot,
                filename: t.filename.clone(),
                title: t.title.clone(),
                audio_key: t.audio_key.clone(),
                duration_ms: t.duration_ms,
                size_bytes: t.size_bytes,
                created_at: now,
            })
            .collect();
        self.track_repo.replace_for_job(job_id, &records).await?;

        let completed = self
            .job_repo
            .mark_completed(job_id, &manifest_key, records.len() as u32)
            .await?;
        if !completed {
            return Err(ApplicationError::invalid_state(
                ctx,
                "job left processing state during assembly",
            ));
        }

        tracing::info!(
            job_id = %job_id,
            tracks = manifest.track_count,
            total_duration_ms = manifest.total_duration_ms,
            total_size_bytes = manifest.total_size_bytes,
            "Job assembled"
        );
        Ok(manifest)
    }
}
