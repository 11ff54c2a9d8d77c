//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod assemble_handler;
mod job_handlers;
mod review_handlers;
mod sample_handlers;

pub use assemble_handler::*;
pub use job_handlers::*;
pub use review_handlers::*;
pub use sample_handlers::*;
