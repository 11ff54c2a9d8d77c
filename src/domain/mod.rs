//! Domain Layer - 领域层
//!
//! 纯算法与值类型，不依赖任何 I/O:
//! - Segment Context: 片段类型、保留区间、顺序号分配
//! - Job Context: 任务状态机
//! - 稿件分割、合成分块、试听样章选择、成品组装

pub mod assembler;
pub mod chunker;
pub mod credits;
pub mod errors;
pub mod job;
pub mod retail_sample;
pub mod segment;
pub mod text_segmenter;

pub use chunker::{chunk_text, Chunk, ChunkLimits};
pub use errors::DomainError;
pub use job::{JobStatus, Phase};
pub use segment::{RepackEntry, SegmentOrderAllocator, SegmentSlot, SegmentStatus, SegmentType};
pub use text_segmenter::{parse_manuscript, DetectionMode, ParsedUnit};
