//! Retail Sample Commands - 试听样章

use uuid::Uuid;

/// 生成样章候选
#[derive(Debug, Clone)]
pub struct SelectRetailSample {
    pub job_id: Uuid,
}

/// 确认样章
#[derive(Debug, Clone)]
pub struct ConfirmRetailSample {
    pub job_id: Uuid,
    pub sample_id: Uuid,
    /// 用户编辑后的文本，与原文并存
    pub edited_text: Option<String>,
}
