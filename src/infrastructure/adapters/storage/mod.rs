//! Storage Adapter - 对象存储实现

mod file_storage;

pub use file_storage::{FileObjectStorage, PresignConfig};
