//! Scoring Adapter - 样章评分实现

mod keyword_scorer;

pub use keyword_scorer::{KeywordScorer, ScorerThresholds};
