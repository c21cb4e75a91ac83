//! HTTP Generation Client - 调用外部文本生成服务
//!
//! 实现 GenerationClientPort trait
//!
//! 外部生成 API:
//! POST {base_url}/api/generate/invoke
//! Request: GenerationRequest (JSON)
//! Response: {"content": "..."} 或 {"content": <结构化 JSON>}
//!
//! POST {base_url}/api/generate/stream
//! Request: GenerationRequest (JSON)
//! Response: NDJSON，每行一个事件
//!   {"type":"content","text":"..."}
//!   {"type":"complete","wordCount":123}
//!   {"type":"error","message":"..."}

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use crate::application::ports::{
    FragmentStream, GenerationClientPort, GenerationError, GenerationEvent, GenerationPayload,
    GenerationRequest,
};

/// 一次性生成响应体
#[derive(Debug, Deserialize)]
struct InvokeHttpResponse {
    content: Value,
}

/// HTTP 生成客户端配置
#[derive(Debug, Clone)]
pub struct HttpGenerationClientConfig {
    /// 生成服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）；流式请求只限制建立连接
    pub timeout_secs: u64,
    /// 网络错误时的重试次数
    pub max_retries: u32,
}

impl Default for HttpGenerationClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            max_retries: 0,
        }
    }
}

impl HttpGenerationClientConfig {
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

/// HTTP 生成客户端
pub struct HttpGenerationClient {
    client: Client,
    config: HttpGenerationClientConfig,
}

impl HttpGenerationClient {
    pub fn new(config: HttpGenerationClientConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn invoke_url(&self) -> String {
        format!("{}/api/generate/invoke", self.config.base_url)
    }

    fn stream_url(&self) -> String {
        format!("{}/api/generate/stream", self.config.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    /// 发送请求，网络错误时按配置重试
    async fn post(
        &self,
        url: &str,
        request: &GenerationRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, GenerationError> {
        let mut attempt = 0;
        loop {
            let mut builder = self.client.post(url).json(request);
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(GenerationError::ServiceError(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let err = map_reqwest_error(e);
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        error = %err,
                        "Generation request failed, retrying"
                    );
                }
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else if e.is_connect() {
        GenerationError::NetworkError(format!("Cannot connect to generation service: {}", e))
    } else {
        GenerationError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl GenerationClientPort for HttpGenerationClient {
    async fn invoke(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationPayload, GenerationError> {
        tracing::debug!(
            url = %self.invoke_url(),
            story_id = %request.story_id,
            target = %request.target,
            context_len = request.context.len(),
            "Sending generation invoke request"
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = self.post(&self.invoke_url(), request, Some(timeout)).await?;
        let body: InvokeHttpResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let payload = match body.content {
            Value::String(text) => GenerationPayload::Text(text),
            other => GenerationPayload::Structured(other),
        };

        tracing::info!(
            story_id = %request.story_id,
            target = %request.target,
            "Generation invoke completed"
        );
        Ok(payload)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
        tracing::debug!(
            url = %self.stream_url(),
            story_id = %request.story_id,
            target = %request.target,
            "Opening generation stream"
        );

        let response = self.post(&self.stream_url(), request, None).await?;
        let bytes = response.bytes_stream().boxed();

        let state = NdjsonState {
            bytes,
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.pending.extend(state.decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.push_back(GenerationEvent::Error {
                            message: format!("stream interrupted: {}", e),
                        });
                    }
                    None => {
                        state.finished = true;
                        state.pending.extend(state.decoder.finish());
                    }
                }
            }
        });

        Ok(stream.boxed())
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

struct NdjsonState<S> {
    bytes: S,
    decoder: NdjsonDecoder,
    pending: VecDeque<GenerationEvent>,
    finished: bool,
}

/// NDJSON 事件解码器
///
/// 按字节缓冲，只在换行处切分，多字节字符跨块时不会被截断
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一个数据块，返回其中完整的事件
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<GenerationEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// 流结束，解析没有换行结尾的最后一行
    pub fn finish(&mut self) -> Vec<GenerationEvent> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line).into_iter().collect()
    }
}

/// 解析一行事件；空行跳过，无法解析的行转换为错误事件
fn decode_line(line: &[u8]) -> Option<GenerationEvent> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(malformed_line(&String::from_utf8_lossy(line), e)),
    };
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerationEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => Some(malformed_line(text, e)),
    }
}

fn malformed_line(line: &str, error: impl std::fmt::Display) -> GenerationEvent {
    tracing::warn!(line = %line.trim(), error = %error, "Malformed stream line");
    GenerationEvent::Error {
        message: format!("malformed stream line: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpGenerationClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_config_builder() {
        let config = HttpGenerationClientConfig::new("http://gen:9000").with_timeout(30);
        assert_eq!(config.base_url, "http://gen:9000");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_decoder_splits_lines_across_chunks() {
        let mut decoder = NdjsonDecoder::new();
        let first = decoder.feed(b"{\"type\":\"content\",\"text\":\"Hel");
        assert!(first.is_empty());

        let events = decoder.feed(b"lo\"}\n{\"type\":\"content\",\"text\":\" there\"}\n");
        assert_eq!(
            events,
            vec![
                GenerationEvent::Content {
                    text: "Hello".to_string()
                },
                GenerationEvent::Content {
                    text: " there".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_decoder_keeps_multibyte_chars_intact() {
        let line = "{\"type\":\"content\",\"text\":\"雪花\"}\n".as_bytes();
        let split = line.len() - 6;
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        let events = decoder.feed(&line[split..]);
        assert_eq!(
            events,
            vec![GenerationEvent::Content {
                text: "雪花".to_string()
            }]
        );
    }

    #[test]
    fn test_decoder_skips_blank_lines() {
        let mut decoder = NdjsonDecoder::new();
        let events = decoder.feed(b"\n\n  \n{\"type\":\"complete\",\"wordCount\":3}\n");
        assert_eq!(events, vec![GenerationEvent::Complete { word_count: Some(3) }]);
    }

    #[test]
    fn test_decoder_reports_corrupt_fragment_as_error() {
        let mut decoder = NdjsonDecoder::new();
        let events = decoder.feed(
            b"{\"type\":\"content\",\"text\":\"The keeper \"}\n\
              {\"type\":\"content\",\"text\":\"lit the\n\
              {\"type\":\"content\",\"text\":\" lamp.\"}\n\
              {\"type\":\"complete\"}\n",
        );
        assert_eq!(
            events[0],
            GenerationEvent::Content {
                text: "The keeper ".to_string()
            }
        );
        match &events[1] {
            GenerationEvent::Error { message } => {
                assert!(message.starts_with("malformed stream line"))
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_decoder_reports_truncated_tail_and_bad_utf8() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.feed(b"{\"type\":\"content\",\"te").is_empty());
        assert!(matches!(
            decoder.finish().as_slice(),
            [GenerationEvent::Error { .. }]
        ));

        let events = decoder.feed(b"\xff\xfe\n");
        assert!(matches!(events.as_slice(), [GenerationEvent::Error { .. }]));
    }

    #[test]
    fn test_decoder_flushes_unterminated_tail() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder
            .feed(b"{\"type\":\"error\",\"message\":\"overloaded\"}")
            .is_empty());
        assert_eq!(
            decoder.finish(),
            vec![GenerationEvent::Error {
                message: "overloaded".to_string()
            }]
        );
    }
}
