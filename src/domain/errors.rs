//! Domain Errors

use thiserror::Error;
use uuid::Uuid;

use super::job::JobStatus;
use super::segment::SegmentType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("稿件内容为空")]
    EmptyManuscript,

    #[error("{segment_type} 的保留区间已满 (容量 {capacity})")]
    CapacityExceeded {
        segment_type: SegmentType,
        capacity: u8,
    },

    #[error("顺序号 {order} 不在 {segment_type} 的保留区间内")]
    OrderOutOfRange { segment_type: SegmentType, order: u8 },

    #[error("顺序号 {order} 已被占用")]
    OrderInUse { order: u8 },

    #[error("没有可审批的正文章节")]
    NoEligibleBodyChapter,

    #[error("需要恰好一个已确认的试听样章 (当前 {found} 个)，请先确认样章")]
    RetailSampleRequired { found: usize },

    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("还有 {count} 个片段未完成合成")]
    IncompleteSegments { count: usize },

    #[error("片段 {segment_id} 缺少音频")]
    MissingAudio { segment_id: Uuid },
}
