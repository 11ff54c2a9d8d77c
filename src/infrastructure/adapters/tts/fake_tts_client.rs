//! Fake TTS Client - 用于测试和本地演练的合成客户端
//!
//! 不调用外部服务，按文本长度生成静音 WAV。可以预置失败脚本，
//! 用来演练重试、永久失败和取消。

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::application::ports::{SynthesisRequest, SynthesizedAudio, TtsEnginePort, TtsError};
use crate::infrastructure::adapters::audio::silent_wav;

/// Fake TTS Client 配置
#[derive(Debug, Clone)]
pub struct FakeTtsClientConfig {
    /// 每个字符对应的音频时长（毫秒）
    pub ms_per_char: u64,
    pub sample_rate: u32,
    /// 模拟合成延迟
    pub latency: Duration,
}

impl Default for FakeTtsClientConfig {
    fn default() -> Self {
        Self {
            ms_per_char: 10,
            sample_rate: 16000,
            latency: Duration::ZERO,
        }
    }
}

/// Fake TTS Client
pub struct FakeTtsClient {
    config: FakeTtsClientConfig,
    /// 按调用顺序依次返回的失败
    script: Mutex<VecDeque<TtsError>>,
    /// 文本包含指定片段时总是失败
    poisoned: Mutex<Vec<(String, TtsError)>>,
    calls: Mutex<Vec<SynthesisRequest>>,
}

impl FakeTtsClient {
    pub fn new(config: FakeTtsClientConfig) -> Self {
        Self {
            config,
            script: Mutex::new(VecDeque::new()),
            poisoned: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeTtsClientConfig::default())
    }

    /// 接下来的调用依次返回这些错误，之后恢复正常
    pub fn fail_next(self, errors: impl IntoIterator<Item = TtsError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(errors);
        }
        self
    }

    /// 文本包含 `needle` 的请求总是返回 `error`
    pub fn fail_when_contains(self, needle: impl Into<String>, error: TtsError) -> Self {
        if let Ok(mut poisoned) = self.poisoned.lock() {
            poisoned.push((needle.into(), error));
        }
        self
    }

    /// 已收到的请求
    pub fn calls(&self) -> Vec<SynthesisRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn scripted_failure(&self, text: &str) -> Option<TtsError> {
        let poisoned = self.poisoned.lock().ok().and_then(|p| {
            p.iter()
                .find(|(needle, _)| text.contains(needle.as_str()))
                .map(|(_, e)| e.clone())
        });
        if poisoned.is_some() {
            return poisoned;
        }
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

#[async_trait]
impl TtsEnginePort for FakeTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        if let Some(error) = self.scripted_failure(&request.text) {
            tracing::debug!(error = %error, "FakeTtsClient: scripted failure");
            return Err(error);
        }

        let duration_ms = (request.text.chars().count() as u64 * self.config.ms_per_char).max(1);
        Ok(SynthesizedAudio {
            audio_data: silent_wav(duration_ms, self.config.sample_rate),
            duration_ms: Some(duration_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TransientKind;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice_id: "voice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_script_then_success() {
        let client = FakeTtsClient::with_defaults().fail_next([TtsError::transient(
            TransientKind::RateLimited,
            "429 rate limit",
        )]);

        assert!(client.synthesize(request("Hello.")).await.is_err());
        let audio = client.synthesize(request("Hello.")).await.unwrap();
        assert_eq!(audio.duration_ms, Some(60));
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_poisoned_text_always_fails() {
        let client = FakeTtsClient::with_defaults()
            .fail_when_contains("forbidden", TtsError::permanent("invalid input"));

        for _ in 0..3 {
            let err = client.synthesize(request("a forbidden word")).await.unwrap_err();
            assert!(!err.is_transient());
        }
        assert!(client.synthesize(request("fine")).await.is_ok());
    }
}
