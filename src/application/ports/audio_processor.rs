//! Audio Processor Port - 音频处理抽象
//!
//! 负责把有序的音频字节流合并为一个流并给出时长，编码细节不在核心逻辑内。

use thiserror::Error;

/// 音频处理错误
#[derive(Debug, Error)]
pub enum AudioProcessingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Incompatible formats: {0}")]
    IncompatibleFormats(String),
}

/// 音频信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u16,
}

/// 合并结果
#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub data: Vec<u8>,
    pub info: AudioInfo,
}

/// Audio Processor Port
pub trait AudioProcessorPort: Send + Sync {
    /// 输出文件扩展名
    fn extension(&self) -> &str;

    /// 读取音频信息
    fn probe(&self, data: &[u8]) -> Result<AudioInfo, AudioProcessingError>;

    /// 按顺序合并多段音频
    fn merge(&self, parts: &[Vec<u8>]) -> Result<MergedAudio, AudioProcessingError>;
}
