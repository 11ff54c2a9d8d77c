//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::retail_sample::SampleMode;
use crate::domain::DetectionMode;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 语音合成服务配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 合成分块配置
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// 自动重试配置
    #[serde(default)]
    pub retry: RetryConfig,

    /// 试听样章配置
    #[serde(default)]
    pub retail_sample: RetailSampleConfig,

    /// 章节识别配置
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 对象存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 任务队列配置
    #[serde(default)]
    pub queue: QueueConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 单个 Job 内的最大并发合成片段数
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// 队列为空时的轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 未指定音色时使用
    #[serde(default = "default_voice_id")]
    pub default_voice_id: String,
}

fn default_max_concurrent_segments() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_voice_id() -> String {
    "narrator-default".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_segments: default_max_concurrent_segments(),
            poll_interval_ms: default_poll_interval_ms(),
            default_voice_id: default_voice_id(),
        }
    }
}

/// 语音合成服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// 合成服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
        }
    }
}

/// 合成分块配置，先触达的上限生效
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_max_words")]
    pub max_words: usize,

    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,
}

fn default_chunk_max_words() -> usize {
    crate::domain::chunker::DEFAULT_MAX_WORDS
}

fn default_chunk_max_chars() -> usize {
    crate::domain::chunker::DEFAULT_MAX_CHARS
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_chunk_max_words(),
            max_chars: default_chunk_max_chars(),
        }
    }
}

/// 自动重试配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// 第一次重试前的等待（秒），之后每次翻倍
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// 首次尝试之外的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 单次等待上限（秒）
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_delay_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_retries: default_max_retries(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// 试听样章配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetailSampleConfig {
    /// 只从前 N 个内容片段中选取
    #[serde(default = "default_sample_segment_limit")]
    pub segment_limit: usize,

    #[serde(default = "default_sample_min_words")]
    pub min_words: usize,

    #[serde(default = "default_sample_max_words")]
    pub max_words: usize,

    /// 未指定时 Job 使用的权重方案
    #[serde(default)]
    pub mode: SampleMode,
}

fn default_sample_segment_limit() -> usize {
    crate::domain::retail_sample::DEFAULT_SEGMENT_LIMIT
}

fn default_sample_min_words() -> usize {
    crate::domain::retail_sample::DEFAULT_MIN_WORDS
}

fn default_sample_max_words() -> usize {
    crate::domain::retail_sample::DEFAULT_MAX_WORDS
}

impl Default for RetailSampleConfig {
    fn default() -> Self {
        Self {
            segment_limit: default_sample_segment_limit(),
            min_words: default_sample_min_words(),
            max_words: default_sample_max_words(),
            mode: SampleMode::default(),
        }
    }
}

/// 章节识别配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmenterConfig {
    /// 未指定时 Job 使用的识别模式
    #[serde(default)]
    pub detection_mode: DetectionMode,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/bookcast.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 对象存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 对象存储根目录
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,

    /// 片段音频扩展名，需与音频处理实现一致
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,

    /// 预签名密钥
    #[serde(default = "default_presign_secret")]
    pub presign_secret: String,

    /// 预签名 URL 前缀
    #[serde(default = "default_presign_base_url")]
    pub presign_base_url: String,

    /// 预签名有效期（秒）
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_secs: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_audio_extension() -> String {
    "wav".to_string()
}

fn default_presign_secret() -> String {
    "change-me".to_string()
}

fn default_presign_base_url() -> String {
    "http://localhost:5080/files".to_string()
}

fn default_presign_ttl() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
            audio_extension: default_audio_extension(),
            presign_secret: default_presign_secret(),
            presign_base_url: default_presign_base_url(),
            presign_ttl_secs: default_presign_ttl(),
        }
    }
}

/// 任务队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// sled 数据目录
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
