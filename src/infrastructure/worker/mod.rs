//! Worker Layer - 后台任务处理
//!
//! JobWorker 消费持久化队列，retry 提供合成请求的指数退避

mod job_worker;
mod retry;

pub use job_worker::{JobWorker, JobWorkerConfig, StageOutcome};
pub use retry::{compute_backoff_delay, run_with_retry, RetryPolicy, RetryTerminal};
