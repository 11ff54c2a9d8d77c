//! Job Context - 任务限界上下文
//!
//! 职责:
//! - Job 状态机
//! - 处理阶段

mod status;

pub use status::{JobStatus, Phase};
