//! HTTP TTS Client - 调用外部语音合成 HTTP 服务
//!
//! 实现 TtsEnginePort trait
//!
//! 外部 API:
//! POST {base_url}/api/tts/synthesize
//! Request: {"text": "...", "voice_id": "..."}  (JSON)
//! Response: audio/wav binary, 时长在 `X-TTS-Duration-Ms` header
//!
//! 重试不在客户端内部做，错误按可重试/永久分类后交给 Worker 的重试策略。

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{
    SynthesisRequest, SynthesizedAudio, TransientKind, TtsEnginePort, TtsError,
};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpTtsClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP TTS 客户端
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TtsError::permanent(format!("cannot build http client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

/// 传输层错误分类
fn classify_transport(e: reqwest::Error) -> TtsError {
    if e.is_timeout() {
        TtsError::transient(TransientKind::Timeout, format!("synthesis request timed out: {}", e))
    } else if e.is_connect() {
        TtsError::transient(
            TransientKind::Connection,
            format!("cannot connect to synthesis service: {}", e),
        )
    } else {
        TtsError::from_message(e.to_string())
    }
}

#[async_trait]
impl TtsEnginePort for HttpTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError> {
        let url = self.synthesize_url();
        tracing::debug!(
            url = %url,
            text_len = request.text.len(),
            voice_id = %request.voice_id,
            "Sending synthesis request"
        );

        let response = self
            .client
            .post(&url)
            .json(&TtsHttpRequest {
                text: &request.text,
                voice_id: &request.voice_id,
            })
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::from_status(status.as_u16(), &body));
        }

        let duration_ms = response
            .headers()
            .get("X-TTS-Duration-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let audio_data = response
            .bytes()
            .await
            .map_err(classify_transport)?
            .to_vec();
        if audio_data.is_empty() {
            return Err(TtsError::permanent("synthesis service returned empty audio"));
        }

        tracing::debug!(
            duration_ms = ?duration_ms,
            audio_size = audio_data.len(),
            "Synthesis request completed"
        );

        Ok(SynthesizedAudio {
            audio_data,
            duration_ms,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(&self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpTtsClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_urls_tolerate_trailing_slash() {
        let client =
            HttpTtsClient::new(HttpTtsClientConfig::new("http://tts:9000/").with_timeout(30))
                .unwrap();
        assert_eq!(client.synthesize_url(), "http://tts:9000/api/tts/synthesize");
        assert_eq!(client.health_url(), "http://tts:9000/health");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        // 保留端口，连接会被拒绝
        let client = HttpTtsClient::new(HttpTtsClientConfig::new("http://127.0.0.1:9").with_timeout(2))
            .unwrap();
        let err = client
            .synthesize(SynthesisRequest {
                text: "Hello.".to_string(),
                voice_id: "v".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert!(!client.health_check().await);
    }
}
