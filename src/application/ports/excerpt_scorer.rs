//! Excerpt Scorer Port - 样章评分抽象
//!
//! 启发式或模型评分都通过这个接口注入，替换实现不影响窗口划分和排序。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::retail_sample::ExcerptScores;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring failed: {0}")]
    Failed(String),
}

/// Excerpt Scorer Port
#[async_trait]
pub trait ExcerptScorerPort: Send + Sync {
    /// 返回各项 [0, 1] 分数
    async fn score(&self, text: &str) -> Result<ExcerptScores, ScoringError>;
}
