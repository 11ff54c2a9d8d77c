//! Segment Context - Value Objects

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::domain::errors::DomainError;

/// 片段类型
///
/// 每种类型占用一段保留的顺序号区间，下游分发工具依赖该区间决定播放位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    OpeningCredits,
    FrontMatter,
    BodyChapter,
    BackMatter,
    BonusChapter,
    TeaserChapter,
    ClosingCredits,
    RetailSample,
}

impl SegmentType {
    /// 按播放顺序排列的全部类型
    pub const ALL: [SegmentType; 8] = [
        SegmentType::OpeningCredits,
        SegmentType::FrontMatter,
        SegmentType::BodyChapter,
        SegmentType::BackMatter,
        SegmentType::BonusChapter,
        SegmentType::TeaserChapter,
        SegmentType::ClosingCredits,
        SegmentType::RetailSample,
    ];

    /// 保留区间（闭区间）
    pub fn range(&self) -> RangeInclusive<u8> {
        match self {
            SegmentType::OpeningCredits => 0..=0,
            SegmentType::FrontMatter => 1..=9,
            SegmentType::BodyChapter => 10..=79,
            SegmentType::BackMatter => 80..=89,
            SegmentType::BonusChapter => 90..=94,
            SegmentType::TeaserChapter => 95..=97,
            SegmentType::ClosingCredits => 98..=98,
            SegmentType::RetailSample => 99..=99,
        }
    }

    pub fn capacity(&self) -> u8 {
        let range = self.range();
        range.end() - range.start() + 1
    }

    /// 片头/片尾署名
    pub fn is_credits(&self) -> bool {
        matches!(self, SegmentType::OpeningCredits | SegmentType::ClosingCredits)
    }

    /// 朗读时是否先念出标题
    pub fn announces_title(&self) -> bool {
        !matches!(
            self,
            SegmentType::OpeningCredits | SegmentType::ClosingCredits | SegmentType::RetailSample
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::OpeningCredits => "opening_credits",
            SegmentType::FrontMatter => "front_matter",
            SegmentType::BodyChapter => "body_chapter",
            SegmentType::BackMatter => "back_matter",
            SegmentType::BonusChapter => "bonus_chapter",
            SegmentType::TeaserChapter => "teaser_chapter",
            SegmentType::ClosingCredits => "closing_credits",
            SegmentType::RetailSample => "retail_sample",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 片段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// 等待人工审核
    PendingReview,
    /// 已审批，等待合成
    Approved,
    /// 已排除，不参与合成
    Excluded,
    /// 合成中
    Processing,
    /// 合成完成
    Completed,
    /// 合成失败
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::PendingReview => "pending_review",
            SegmentStatus::Approved => "approved",
            SegmentStatus::Excluded => "excluded",
            SegmentStatus::Processing => "processing",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_review" => Some(SegmentStatus::PendingReview),
            "approved" => Some(SegmentStatus::Approved),
            "excluded" => Some(SegmentStatus::Excluded),
            "processing" => Some(SegmentStatus::Processing),
            "completed" => Some(SegmentStatus::Completed),
            "failed" => Some(SegmentStatus::Failed),
            _ => None,
        }
    }

    /// 合成阶段的终态
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SegmentStatus::Completed | SegmentStatus::Failed | SegmentStatus::Excluded
        )
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 片段槽位 = (类型, 顺序号)
///
/// 不变量: order 必定落在 segment_type 的保留区间内。
/// 字段私有，只能通过 [`SegmentSlot::new`] 或分配器构造，
/// 因此非法的 (类型, 顺序号) 组合无法表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawSlot", into = "RawSlot")]
pub struct SegmentSlot {
    order: u8,
    segment_type: SegmentType,
}

#[derive(Serialize, Deserialize)]
struct RawSlot {
    segment_type: SegmentType,
    order: u8,
}

impl TryFrom<RawSlot> for SegmentSlot {
    type Error = DomainError;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        SegmentSlot::new(raw.segment_type, raw.order)
    }
}

impl From<SegmentSlot> for RawSlot {
    fn from(slot: SegmentSlot) -> Self {
        RawSlot {
            segment_type: slot.segment_type,
            order: slot.order,
        }
    }
}

impl SegmentSlot {
    pub fn new(segment_type: SegmentType, order: u8) -> Result<Self, DomainError> {
        if !segment_type.range().contains(&order) {
            return Err(DomainError::OrderOutOfRange {
                segment_type,
                order,
            });
        }
        Ok(Self {
            order,
            segment_type,
        })
    }

    pub fn segment_type(&self) -> SegmentType {
        self.segment_type
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    /// 类型内序号，从 1 开始
    pub fn ordinal(&self) -> u8 {
        self.order - self.segment_type.range().start() + 1
    }

    /// 导出文件名
    ///
    /// 文件名按字典序排序即为播放顺序，这是与下游分发工具的兼容约定，不可随意修改。
    pub fn filename(&self, ext: &str) -> String {
        let order = self.order;
        let stem = match self.segment_type {
            SegmentType::OpeningCredits => "00_opening_credits".to_string(),
            SegmentType::FrontMatter => format!("{:02}_front_matter_{:02}", order, order),
            SegmentType::BodyChapter => format!("{:02}_chapter_{:02}", order, order - 9),
            SegmentType::BackMatter => format!("{:02}_back_matter_{:02}", order, order - 79),
            SegmentType::BonusChapter => format!("{:02}_bonus_{:02}", order, order - 89),
            SegmentType::TeaserChapter => format!("{:02}_teaser_{:02}", order, order - 94),
            SegmentType::ClosingCredits => "98_closing_credits".to_string(),
            SegmentType::RetailSample => "99_retail_sample".to_string(),
        };
        format!("{}.{}", stem, ext)
    }
}
