//! File Storage - 文件系统对象存储实现
//!
//! 实现 ObjectStoragePort trait。对象键映射为根目录下的相对路径，
//! 写入先落临时文件再 rename，读者不会看到写了一半的对象。

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::application::ports::{ObjectStoragePort, StorageError};

/// 预签名配置
#[derive(Debug, Clone)]
pub struct PresignConfig {
    /// 对外访问的基础 URL
    pub base_url: String,
    pub secret: String,
}

/// 文件系统对象存储
pub struct FileObjectStorage {
    /// 存储根目录
    root_dir: PathBuf,
    presign: PresignConfig,
}

fn io_err(e: std::io::Error) -> StorageError {
    StorageError::IoError(e.to_string())
}

/// 预签名摘要：md5("secret:key:expires")
fn signature(secret: &str, key: &str, expires: i64) -> String {
    format!("{:x}", md5::compute(format!("{}:{}:{}", secret, key, expires)))
}

impl FileObjectStorage {
    /// 创建存储，确保根目录存在
    pub async fn new(
        root_dir: impl AsRef<Path>,
        presign: PresignConfig,
    ) -> Result<Self, StorageError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await.map_err(io_err)?;

        Ok(Self { root_dir, presign })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// 对象键 -> 文件路径；拒绝空键、绝对路径和 `..`
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let relative = Path::new(key);
        let valid = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root_dir.join(relative))
    }

    /// 校验预签名参数
    pub fn verify_presigned(&self, key: &str, expires: i64, sig: &str) -> bool {
        expires >= Utc::now().timestamp() && signature(&self.presign.secret, key, expires) == sig
    }
}

#[async_trait]
impl ObjectStoragePort for FileObjectStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, data).await.map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        tracing::debug!(key = %key, size = data.len(), "Object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %key, "Object deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        self.resolve(key)?;

        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.presign.base_url.trim_end_matches('/'),
            key,
            expires,
            signature(&self.presign.secret, key, expires)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(root: &Path) -> FileObjectStorage {
        FileObjectStorage::new(
            root,
            PresignConfig {
                base_url: "http://files.local/".to_string(),
                secret: "s3cret".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let temp_dir = tempdir().unwrap();
        let storage = storage(temp_dir.path()).await;
        let key = "jobs/abc/segments/seg.wav";

        storage.put(key, b"fake wav data").await.unwrap();
        assert!(storage.exists(key).await);
        assert_eq!(storage.get(key).await.unwrap(), b"fake wav data");

        // 覆盖写入
        storage.put(key, b"v2").await.unwrap();
        assert_eq!(storage.get(key).await.unwrap(), b"v2");

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await);
        storage.delete(key).await.unwrap();
        assert!(matches!(
            storage.get(key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp_dir = tempdir().unwrap();
        let storage = storage(temp_dir.path()).await;

        for key in ["", "../outside", "jobs/../../etc/passwd", "/abs/path", "a\\b"] {
            assert!(
                matches!(storage.put(key, b"x").await, Err(StorageError::InvalidKey(_))),
                "{key}"
            );
        }
    }

    #[tokio::test]
    async fn test_presigned_url_verifies() {
        let temp_dir = tempdir().unwrap();
        let storage = storage(temp_dir.path()).await;
        let key = "jobs/abc/manifest.json";

        let url = storage.presign(key, Duration::from_secs(600)).unwrap();
        assert!(url.starts_with("http://files.local/jobs/abc/manifest.json?expires="));

        let query = url.split('?').nth(1).unwrap();
        let mut expires = 0i64;
        let mut sig = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse().unwrap(),
                Some(("signature", v)) => sig = v.to_string(),
                _ => {}
            }
        }

        assert!(storage.verify_presigned(key, expires, &sig));
        assert!(!storage.verify_presigned("jobs/other/manifest.json", expires, &sig));
        assert!(!storage.verify_presigned(key, Utc::now().timestamp() - 1, &sig));
    }
}
