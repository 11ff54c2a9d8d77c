//! Job Queue Port - 持久化任务队列
//!
//! 队列必须持久化：Worker 重启后，已领取但未确认的工作项重新回到队列，
//! 配合片段级的幂等续传，已完成的片段不会被重复合成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Work item not in flight: {0}")]
    NotInFlight(Uuid),
}

/// 工作阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStage {
    /// 切分稿件
    Parse,
    /// 合成并组装
    Synthesize,
}

impl WorkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStage::Parse => "parse",
            WorkStage::Synthesize => "synthesize",
        }
    }
}

/// 工作项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub stage: WorkStage,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(job_id: Uuid, stage: WorkStage) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            stage,
            enqueued_at: Utc::now(),
        }
    }
}

/// Job Queue Port
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// 入队
    async fn enqueue(&self, item: WorkItem) -> Result<(), QueueError>;

    /// 领取最早入队的工作项，原子地移入 in-flight
    async fn claim(&self) -> Result<Option<WorkItem>, QueueError>;

    /// 确认完成，从 in-flight 移除
    async fn ack(&self, item_id: Uuid) -> Result<(), QueueError>;

    /// 把 in-flight 的工作项全部放回队列，返回数量（启动时调用）
    async fn recover_in_flight(&self) -> Result<usize, QueueError>;

    /// 等待新的工作项入队
    async fn wait_for_work(&self);

    /// 队列长度
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
