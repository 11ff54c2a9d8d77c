//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml / config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `BOOKCAST_TTS__URL=http://tts-server:8000`
/// - `BOOKCAST_WORKER__MAX_CONCURRENT_SEGMENTS=8`
/// - `BOOKCAST_RETRY__BASE_DELAY_SECS=10`
/// - `BOOKCAST_DATABASE__PATH=/data/bookcast.db`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// `config_path` 为 None 时搜索当前目录下的默认配置文件
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    builder = builder
        .set_default("worker.max_concurrent_segments", 4)?
        .set_default("worker.poll_interval_ms", 2000)?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 120)?
        .set_default("retry.base_delay_secs", 30)?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.max_delay_secs", 120)?
        .set_default("database.path", "data/bookcast.db")?
        .set_default("database.max_connections", 5)?
        .set_default("storage.root_dir", "data/objects")?
        .set_default("queue.path", "data/queue")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 例如: BOOKCAST_TTS__URL=http://tts-server:8000
    builder = builder.add_source(
        Environment::with_prefix("BOOKCAST")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.worker.max_concurrent_segments == 0 {
        return Err(invalid("worker.max_concurrent_segments cannot be 0"));
    }
    if config.worker.default_voice_id.trim().is_empty() {
        return Err(invalid("worker.default_voice_id cannot be empty"));
    }

    if config.tts.url.is_empty() {
        return Err(invalid("TTS URL cannot be empty"));
    }
    if config.tts.timeout_secs == 0 {
        return Err(invalid("tts.timeout_secs cannot be 0"));
    }

    if config.chunking.max_words == 0 || config.chunking.max_chars == 0 {
        return Err(invalid("chunking limits cannot be 0"));
    }

    if config.retry.max_delay_secs < config.retry.base_delay_secs {
        return Err(invalid("retry.max_delay_secs must be >= retry.base_delay_secs"));
    }

    let sample = &config.retail_sample;
    if sample.segment_limit == 0 || sample.min_words == 0 {
        return Err(invalid("retail_sample limits cannot be 0"));
    }
    if sample.min_words > sample.max_words {
        return Err(invalid("retail_sample.min_words must be <= retail_sample.max_words"));
    }

    if config.database.path.is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }
    if config.database.max_connections == 0 {
        return Err(invalid("database.max_connections cannot be 0"));
    }

    if config.storage.root_dir.as_os_str().is_empty() {
        return Err(invalid("storage.root_dir cannot be empty"));
    }
    if config.storage.audio_extension.is_empty() {
        return Err(invalid("storage.audio_extension cannot be empty"));
    }
    if config.storage.presign_base_url.is_empty() {
        return Err(invalid("storage.presign_base_url cannot be empty"));
    }

    if config.queue.path.as_os_str().is_empty() {
        return Err(invalid("queue.path cannot be empty"));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!(
        "Worker: max_concurrent_segments={}, poll_interval={}ms, default_voice={}",
        config.worker.max_concurrent_segments,
        config.worker.poll_interval_ms,
        config.worker.default_voice_id
    );
    tracing::info!("TTS URL: {}", config.tts.url);
    tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
    tracing::info!(
        "Chunking: max_words={}, max_chars={}",
        config.chunking.max_words,
        config.chunking.max_chars
    );
    tracing::info!(
        "Retry: base={}s, max={}s, retries={}",
        config.retry.base_delay_secs,
        config.retry.max_delay_secs,
        config.retry.max_retries
    );
    tracing::info!(
        "Retail Sample: segments={}, words={}..={}, mode={}",
        config.retail_sample.segment_limit,
        config.retail_sample.min_words,
        config.retail_sample.max_words,
        config.retail_sample.mode.as_str()
    );
    tracing::info!("Detection Mode: {}", config.segmenter.detection_mode.as_str());
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Database Max Connections: {}", config.database.max_connections);
    tracing::info!("Object Storage: {:?}", config.storage.root_dir);
    tracing::info!("Queue: {:?}", config.queue.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
