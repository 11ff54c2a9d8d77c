//! Job Queries

use uuid::Uuid;

/// 获取 Job 详情查询
#[derive(Debug, Clone)]
pub struct GetJob {
    pub job_id: Uuid,
}

/// 按 segment_order 获取片段（附导出文件名）
#[derive(Debug, Clone)]
pub struct GetOrderedSegments {
    pub job_id: Uuid,
}

/// 获取试听样章候选（按排名）
#[derive(Debug, Clone)]
pub struct ListRetailSamples {
    pub job_id: Uuid,
}
