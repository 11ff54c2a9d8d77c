//! Object Storage Port - 出站端口
//!
//! 稿件、片段音频和成品清单的对象存储抽象。键为 `/` 分隔的相对路径，
//! 例如 `jobs/{job_id}/segments/{segment_id}.wav`。

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 对象键约定
pub mod keys {
    use super::Uuid;

    pub fn manuscript(job_id: Uuid) -> String {
        format!("jobs/{}/manuscript.txt", job_id)
    }

    pub fn segment_audio(job_id: Uuid, segment_id: Uuid, ext: &str) -> String {
        format!("jobs/{}/segments/{}.{}", job_id, segment_id, ext)
    }

    pub fn manifest(job_id: Uuid) -> String {
        format!("jobs/{}/manifest.json", job_id)
    }
}

/// Object Storage Port
#[async_trait]
pub trait ObjectStoragePort: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> bool;

    /// 生成带过期时间的访问 URL
    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}
