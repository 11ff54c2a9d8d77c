//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：处理所有写操作

mod job_commands;
mod review_commands;
mod sample_commands;

pub mod handlers;

pub use job_commands::*;
pub use review_commands::*;
pub use sample_commands::*;
