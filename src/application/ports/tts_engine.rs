//! TTS Engine Port - 语音合成抽象
//!
//! 外部语音合成服务被视为不透明能力: `synthesize(text, voice_id) -> 音频字节`。
//! 错误分为可重试（限流、超时、5xx、连接重置/拒绝、资源耗尽、配额超限）和永久两类。

use async_trait::async_trait;
use thiserror::Error;

/// 可重试错误的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    Timeout,
    ServerError(u16),
    Connection,
    ResourceExhausted,
    QuotaExceeded,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::RateLimited => "rate_limited",
            TransientKind::Timeout => "timeout",
            TransientKind::ServerError(_) => "server_error",
            TransientKind::Connection => "connection",
            TransientKind::ResourceExhausted => "resource_exhausted",
            TransientKind::QuotaExceeded => "quota_exceeded",
        }
    }
}

/// TTS 错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TtsError {
    #[error("{message}")]
    Transient { kind: TransientKind, message: String },

    #[error("{0}")]
    Permanent(String),
}

impl TtsError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TtsError::Transient { .. })
    }

    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("synthesis service returned {status}: {body}");
        match status {
            429 => Self::transient(TransientKind::RateLimited, message),
            408 | 504 => Self::transient(TransientKind::Timeout, message),
            500..=599 => Self::transient(TransientKind::ServerError(status), message),
            _ => match transient_kind_of(body) {
                Some(kind) => Self::transient(kind, message),
                None => Self::permanent(message),
            },
        }
    }

    /// 根据错误文本分类
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match transient_kind_of(&message) {
            Some(kind) => Self::transient(kind, message),
            None => Self::permanent(message),
        }
    }
}

fn transient_kind_of(message: &str) -> Option<TransientKind> {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["rate limit", "rate_limit", "too many requests"]) {
        Some(TransientKind::RateLimited)
    } else if has(&["timeout", "timed out"]) {
        Some(TransientKind::Timeout)
    } else if has(&["connection reset", "connection refused"]) {
        Some(TransientKind::Connection)
    } else if has(&["resource exhausted", "resource_exhausted"]) {
        Some(TransientKind::ResourceExhausted)
    } else if has(&["quota exceeded", "quota_exceeded"]) {
        Some(TransientKind::QuotaExceeded)
    } else {
        None
    }
}

/// 合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
}

/// 合成结果
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// 原始音频数据（WAV）
    pub audio_data: Vec<u8>,
    pub duration_ms: Option<u64>,
}

/// TTS Engine Port
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError>;

    /// 检查 TTS 服务是否可用
    async fn health_check(&self) -> bool {
        true
    }
}
