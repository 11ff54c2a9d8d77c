//! Segment Context - 片段限界上下文
//!
//! 职责:
//! - 片段类型与保留区间
//! - 顺序号分配与导出文件名

mod allocator;
mod value_objects;

pub use allocator::{RepackEntry, SegmentOrderAllocator};
pub use value_objects::{SegmentSlot, SegmentStatus, SegmentType};

/// 文本的词数（按空白切分）
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 文本的字符数
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}
