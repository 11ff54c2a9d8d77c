//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod events;
pub mod persistence;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{EventPublisher, JobEvent};
pub use persistence::SledJobQueue;
pub use worker::{JobWorker, JobWorkerConfig};
