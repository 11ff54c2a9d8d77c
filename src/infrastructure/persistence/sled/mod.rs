//! Sled Persistence - 嵌入式 KV 存储实现

mod job_queue;

pub use job_queue::SledJobQueue;
