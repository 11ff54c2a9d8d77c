//! 成品组装
//!
//! 所有未排除片段完成合成后，按 segment_order 排出最终曲目并生成清单。
//! 音频拼接和编码交给外部音频处理能力，这里只保证顺序和清单内容正确。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::segment::{SegmentSlot, SegmentStatus, SegmentType};

/// 组装输入（一个片段的合成结果）
#[derive(Debug, Clone)]
pub struct TrackSource {
    pub segment_id: Uuid,
    pub slot: SegmentSlot,
    pub title: String,
    pub status: SegmentStatus,
    pub audio_key: Option<String>,
    pub duration_ms: Option<u64>,
    pub size_bytes: Option<u64>,
}

/// 最终曲目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTrack {
    /// 播放位置，从 1 开始
    pub position: u32,
    pub segment_id: Uuid,
    pub slot: SegmentSlot,
    pub filename: String,
    pub title: String,
    pub audio_key: String,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

/// 清单中的 Job 元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestJob {
    pub job_id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub voice_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTrack {
    pub position: u32,
    pub filename: String,
    pub title: String,
    pub segment_type: SegmentType,
    pub segment_order: u8,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub job: ManifestJob,
    pub generated_at: DateTime<Utc>,
    pub track_count: usize,
    pub total_duration_ms: u64,
    pub total_size_bytes: u64,
    pub tracks: Vec<ManifestTrack>,
}

/// 按 segment_order 排出曲目
///
/// 排除的片段不进入曲目；其余片段必须全部 completed 且带有音频，
/// 并且恰好有一个试听样章作为最后一轨，否则报错。
pub fn order_tracks(
    sources: Vec<TrackSource>,
    audio_extension: &str,
) -> Result<Vec<AssembledTrack>, DomainError> {
    let mut included: Vec<TrackSource> = sources
        .into_iter()
        .filter(|s| s.status != SegmentStatus::Excluded)
        .collect();

    let incomplete = included
        .iter()
        .filter(|s| s.status != SegmentStatus::Completed)
        .count();
    if incomplete > 0 {
        return Err(DomainError::IncompleteSegments { count: incomplete });
    }

    included.sort_by_key(|s| s.slot.order());

    let samples = included
        .iter()
        .filter(|s| s.slot.segment_type() == SegmentType::RetailSample)
        .count();
    if samples != 1 {
        return Err(DomainError::RetailSampleRequired { found: samples });
    }

    included
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            let audio_key = source.audio_key.ok_or(DomainError::MissingAudio {
                segment_id: source.segment_id,
            })?;
            Ok(AssembledTrack {
                position: i as u32 + 1,
                segment_id: source.segment_id,
                slot: source.slot,
                filename: source.slot.filename(audio_extension),
                title: source.title,
                audio_key,
                duration_ms: source.duration_ms.unwrap_or(0),
                size_bytes: source.size_bytes.unwrap_or(0),
            })
        })
        .collect()
}

/// 生成清单
pub fn build_manifest(
    job: ManifestJob,
    tracks: &[AssembledTrack],
    generated_at: DateTime<Utc>,
) -> Manifest {
    let tracks: Vec<ManifestTrack> = tracks
        .iter()
        .map(|t| ManifestTrack {
            position: t.position,
            filename: t.filename.clone(),
            title: t.title.clone(),
            segment_type: t.slot.segment_type(),
            segment_order: t.slot.order(),
            duration_ms: t.duration_ms,
            size_bytes: t.size_bytes,
        })
        .collect();

    Manifest {
        job,
        generated_at,
        track_count: tracks.len(),
        total_duration_ms: tracks.iter().map(|t| t.duration_ms).sum(),
        total_size_bytes: tracks.iter().map(|t| t.size_bytes).sum(),
        tracks,
    }
}
