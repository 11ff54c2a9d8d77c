//! Review Commands - 章节审核

use uuid::Uuid;

use crate::domain::SegmentType;

/// 调整显示顺序（只改 chapter_index）
#[derive(Debug, Clone)]
pub struct ReorderSegments {
    pub job_id: Uuid,
    pub ordered_ids: Vec<Uuid>,
}

/// 修改片段类型（重新分配顺序号）
#[derive(Debug, Clone)]
pub struct SetSegmentType {
    pub job_id: Uuid,
    pub segment_id: Uuid,
    pub segment_type: SegmentType,
}

/// 纳入/排除片段
#[derive(Debug, Clone)]
pub struct SetSegmentIncluded {
    pub job_id: Uuid,
    pub segment_id: Uuid,
    pub included: bool,
}

/// 审批章节
#[derive(Debug, Clone)]
pub struct ApproveChapters {
    pub job_id: Uuid,
    /// 为 Some 时只纳入列出的片段（片头片尾总是纳入）
    pub segment_ids: Option<Vec<Uuid>>,
}
