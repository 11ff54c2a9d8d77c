//! Job Commands

use uuid::Uuid;

use crate::domain::retail_sample::SampleMode;
use crate::domain::DetectionMode;

/// 导入稿件命令（创建 pending 状态的 Job 并入队）
#[derive(Debug, Clone)]
pub struct IngestManuscript {
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    /// 为空时使用配置的默认音色
    pub voice_id: Option<String>,
    pub detection_mode: Option<DetectionMode>,
    pub sample_mode: Option<SampleMode>,
    pub manuscript_text: String,
}

/// 切分稿件命令（Worker 领取 Parse 工作项后执行）
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub job_id: Uuid,
}

/// 组装命令（所有片段合成完成后执行）
#[derive(Debug, Clone)]
pub struct AssembleJob {
    pub job_id: Uuid,
}

/// 取消命令
#[derive(Debug, Clone)]
pub struct CancelJob {
    pub job_id: Uuid,
}

/// 人工重试命令，不受自动重试次数限制
#[derive(Debug, Clone)]
pub struct RetryJob {
    pub job_id: Uuid,
}
