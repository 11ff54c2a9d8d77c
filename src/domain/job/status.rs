//! Job Context - 状态机

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Job 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待 Worker 领取
    Pending,
    /// 正在切分稿件
    Parsing,
    /// 等待人工审核章节
    ChaptersPending,
    /// 章节已审批，等待合成
    ChaptersApproved,
    /// 合成中
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Parsing,
        JobStatus::ChaptersPending,
        JobStatus::ChaptersApproved,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Parsing => "parsing",
            JobStatus::ChaptersPending => "chapters_pending",
            JobStatus::ChaptersApproved => "chapters_approved",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 非终态集合（可被取消）
    pub fn non_terminal() -> Vec<JobStatus> {
        Self::ALL.into_iter().filter(|s| !s.is_terminal()).collect()
    }

    /// 状态迁移表
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if next == Cancelled {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Pending, Parsing)
                | (Parsing, ChaptersPending)
                | (Parsing, Failed)
                | (ChaptersPending, ChaptersApproved)
                | (ChaptersApproved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                // 人工重试
                | (Failed, Pending)
        )
    }

    /// 校验迁移并返回目标状态
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// 所有可迁移到 `next` 的源状态
    pub fn sources_of(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 处理阶段（用于错误上下文）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ingestion,
    Parsing,
    Review,
    Synthesis,
    Assembly,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Ingestion => "ingestion",
            Phase::Parsing => "parsing",
            Phase::Review => "review",
            Phase::Synthesis => "synthesis",
            Phase::Assembly => "assembly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingestion" => Some(Phase::Ingestion),
            "parsing" => Some(Phase::Parsing),
            "review" => Some(Phase::Review),
            "synthesis" => Some(Phase::Synthesis),
            "assembly" => Some(Phase::Assembly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
