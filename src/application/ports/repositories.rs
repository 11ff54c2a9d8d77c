//! Repository Ports - 出站端口
//!
//! 定义数据持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite）
//!
//! 顺序号唯一性和区间约束由实现方在事务内校验，不能只依赖应用层。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::retail_sample::{ExcerptScores, SampleMode};
use crate::domain::{DetectionMode, DomainError, JobStatus, Phase, SegmentSlot, SegmentStatus};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    /// 条件更新未命中（状态已被其他操作改变）
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 事务内触发的领域规则
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// ============================================================================
// Job Repository
// ============================================================================

/// 失败信息
///
/// `message` 是内部错误原文，只用于诊断，不返回给用户。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub classification: String,
    pub reference: String,
    pub guidance: String,
    pub message: String,
    pub phase: Phase,
    pub segment_id: Option<Uuid>,
}

/// Job 实体（用于持久化）
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub voice_id: String,
    pub status: JobStatus,
    pub manuscript_key: String,
    pub detection_mode: DetectionMode,
    pub sample_mode: SampleMode,
    pub segment_count: u32,
    pub track_count: u32,
    pub manifest_key: Option<String>,
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job Repository Port
#[async_trait]
pub trait JobRepositoryPort: Send + Sync {
    /// 创建 Job
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找 Job
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError>;

    /// 条件迁移：仅当当前状态属于 `from` 时更新为 `to`
    ///
    /// 返回是否命中
    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, RepositoryError>;

    /// 标记失败并记录失败信息
    async fn mark_failed(
        &self,
        id: Uuid,
        from: &[JobStatus],
        failure: &JobFailure,
    ) -> Result<bool, RepositoryError>;

    /// 标记完成
    async fn mark_completed(
        &self,
        id: Uuid,
        manifest_key: &str,
        track_count: u32,
    ) -> Result<bool, RepositoryError>;

    /// 人工重试: failed -> pending，清除失败信息
    async fn reset_for_retry(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// 更新片段数量
    async fn update_segment_count(&self, id: Uuid, count: u32) -> Result<(), RepositoryError>;
}

// ============================================================================
// Segment Repository
// ============================================================================

/// 片段实体（用于持久化）
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    /// 原始出现顺序，创建后不可变
    pub source_order: i64,
    /// 用户可调整的显示顺序
    pub chapter_index: i64,
    pub slot: SegmentSlot,
    pub title: String,
    pub text: String,
    pub word_count: u32,
    pub char_count: u32,
    pub status: SegmentStatus,
    pub audio_key: Option<String>,
    pub duration_ms: Option<u64>,
    pub size_bytes: Option<u64>,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SegmentRecord {
    /// 新建待审核片段
    pub fn new(
        job_id: Uuid,
        source_order: i64,
        slot: SegmentSlot,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            source_order,
            chapter_index: source_order,
            slot,
            title: title.into(),
            word_count: crate::domain::segment::word_count(&text) as u32,
            char_count: crate::domain::segment::char_count(&text) as u32,
            text,
            status: SegmentStatus::PendingReview,
            audio_key: None,
            duration_ms: None,
            size_bytes: None,
            attempts: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn filename(&self, ext: &str) -> String {
        self.slot.filename(ext)
    }
}

/// 审批结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalSummary {
    pub approved: usize,
    pub excluded: usize,
    /// 已完成的片段保持 completed（断点续传）
    pub already_completed: usize,
}

/// 片段合成结果
#[derive(Debug, Clone)]
pub struct SegmentAudio {
    pub audio_key: String,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

/// Segment Repository Port
///
/// 所有会改动顺序号的操作都在单个事务内完成读-改-写。
#[async_trait]
pub trait SegmentRepositoryPort: Send + Sync {
    /// 批量插入一个 Job 的片段（单事务）
    async fn insert_batch(&self, segments: &[SegmentRecord]) -> Result<(), RepositoryError>;

    /// 获取 Job 的所有片段，按 segment_order 排序
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<SegmentRecord>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SegmentRecord>, RepositoryError>;

    /// 调整显示顺序：`ordered_ids` 必须恰好是该 Job 全部片段的一个排列
    ///
    /// 只更新 chapter_index
    async fn reorder(&self, job_id: Uuid, ordered_ids: &[Uuid]) -> Result<(), RepositoryError>;

    /// 修改片段类型，在新类型区间内重新分配顺序号
    async fn change_type(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        segment_type: crate::domain::SegmentType,
    ) -> Result<SegmentRecord, RepositoryError>;

    /// 纳入/排除片段
    async fn set_included(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        included: bool,
    ) -> Result<SegmentRecord, RepositoryError>;

    /// 审批（单事务）
    ///
    /// `selected` 为 Some 时，未列出的非片头片尾片段全部排除。
    /// 没有可用正文章节时返回 `DomainError::NoEligibleBodyChapter`，
    /// 没有试听样章时返回 `DomainError::RetailSampleRequired`，都不做任何修改。
    /// Job 状态的 chapters_pending -> chapters_approved 在同一事务内完成。
    async fn approve(
        &self,
        job_id: Uuid,
        selected: Option<&[Uuid]>,
    ) -> Result<ApprovalSummary, RepositoryError>;

    /// approved/processing -> processing，返回是否命中
    async fn mark_processing(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn mark_completed(
        &self,
        id: Uuid,
        audio: &SegmentAudio,
        attempts: u32,
    ) -> Result<(), RepositoryError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        attempts: u32,
    ) -> Result<(), RepositoryError>;

    /// 人工重试：failed 片段回到 pending_review，返回受影响数量
    async fn reset_failed(&self, job_id: Uuid) -> Result<u64, RepositoryError>;

    /// 合成中断的片段回到 approved（取消或重启后）
    async fn release_processing(&self, job_id: Uuid) -> Result<u64, RepositoryError>;
}

// ============================================================================
// Track Repository
// ============================================================================

/// 曲目实体（用于持久化）
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub segment_id: Uuid,
    pub position: u32,
    pub slot: SegmentSlot,
    pub filename: String,
    pub title: String,
    pub audio_key: String,
    pub duration_ms: u64,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Track Repository Port
#[async_trait]
pub trait TrackRepositoryPort: Send + Sync {
    /// 替换 Job 的全部曲目（单事务）
    async fn replace_for_job(
        &self,
        job_id: Uuid,
        tracks: &[TrackRecord],
    ) -> Result<(), RepositoryError>;

    /// 按播放位置排序
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<TrackRecord>, RepositoryError>;
}

// ============================================================================
// Retail Sample Repository
// ============================================================================

/// 试听样章候选（用于持久化）
#[derive(Debug, Clone)]
pub struct RetailSampleRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub segment_id: Uuid,
    pub segment_order: u8,
    pub start_offset: u32,
    pub end_offset: u32,
    /// 自动推荐的原文
    pub text: String,
    /// 用户编辑后的文本，与原文并存
    pub edited_text: Option<String>,
    pub word_count: u32,
    pub scores: ExcerptScores,
    pub overall_score: f64,
    pub mode: SampleMode,
    pub rank: u32,
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl RetailSampleRecord {
    /// 实际用于合成的文本
    pub fn effective_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.text)
    }
}

/// Retail Sample Repository Port
#[async_trait]
pub trait RetailSampleRepositoryPort: Send + Sync {
    /// 替换 Job 的候选列表（单事务）
    async fn replace_candidates(
        &self,
        job_id: Uuid,
        candidates: &[RetailSampleRecord],
    ) -> Result<(), RepositoryError>;

    /// 按排名排序
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<RetailSampleRecord>, RepositoryError>;

    /// 确认样章（单事务，持有 Job 锁，要求 chapters_pending）
    ///
    /// 该候选 is_final = true，其余全部置 false，并创建或更新 order 99 的样章片段。
    async fn confirm(
        &self,
        job_id: Uuid,
        sample_id: Uuid,
        edited_text: Option<&str>,
        segment_title: &str,
    ) -> Result<(RetailSampleRecord, SegmentRecord), RepositoryError>;
}
