//! Fake Generation Client - 用于测试与本地开发的生成客户端
//!
//! 按脚本顺序返回预设回复；脚本为空时按目标类型生成占位内容

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ports::{
    FragmentStream, GenerationClientPort, GenerationError, GenerationEvent, GenerationPayload,
    GenerationRequest,
};
use crate::domain::ContentKind;

/// 预设回复
enum ScriptedReply {
    Payload(GenerationPayload),
    Events(Vec<GenerationEvent>),
    Channel(mpsc::UnboundedReceiver<GenerationEvent>),
    Failure(String),
}

/// Fake Generation Client
pub struct FakeGenerationClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    /// 占位内容逐词输出的间隔
    fragment_delay: Duration,
}

impl FakeGenerationClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fragment_delay: Duration::ZERO,
        }
    }

    /// 占位内容每个片段之间等待一段时间，便于观察打字机效果
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// 下一次调用返回文本
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedReply::Payload(GenerationPayload::Text(text.into())));
    }

    /// 下一次调用返回结构化数据
    pub fn push_structured(&self, value: serde_json::Value) {
        self.push(ScriptedReply::Payload(GenerationPayload::Structured(value)));
    }

    /// 下一次流式调用按顺序输出事件
    pub fn push_stream(&self, events: Vec<GenerationEvent>) {
        self.push(ScriptedReply::Events(events));
    }

    /// 下一次流式调用由返回的发送端驱动
    pub fn push_channel(&self) -> mpsc::UnboundedSender<GenerationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedReply::Channel(rx));
        tx
    }

    /// 下一次调用直接失败
    pub fn push_error(&self, message: impl Into<String>) {
        self.push(ScriptedReply::Failure(message.into()));
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn push(&self, reply: ScriptedReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    fn next_reply(&self, request: &GenerationRequest) -> Option<ScriptedReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

impl Default for FakeGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// 按目标类型生成占位内容
fn placeholder(request: &GenerationRequest) -> String {
    let subject = match &request.instructions {
        Some(instructions) => format!("{} ({})", request.step_name, instructions),
        None => request.step_name.clone(),
    };
    match request.kind {
        ContentKind::FreeText | ContentKind::NarrativePerUnit => format!(
            "Placeholder {} for {}. The story continues from what came before.",
            subject.to_lowercase(),
            request.target
        ),
        ContentKind::StructuredList => json!([
            {"name": "First", "summary": format!("{} entry one", subject)},
            {"name": "Second", "summary": format!("{} entry two", subject)}
        ])
        .to_string(),
        ContentKind::StructuredTable => json!([
            {"scene": 1, "pov": "First", "description": "Opening"},
            {"scene": 2, "pov": "Second", "description": "Turn"}
        ])
        .to_string(),
        ContentKind::Report => json!({
            "pov_analysis": {"distribution": {"First": 1, "Second": 1}},
            "recommendations": {"high_priority": [format!("Revisit {}", subject)]},
            "overall_assessment": {"readiness_score": "6/10"}
        })
        .to_string(),
    }
}

#[async_trait]
impl GenerationClientPort for FakeGenerationClient {
    async fn invoke(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationPayload, GenerationError> {
        match self.next_reply(request) {
            Some(ScriptedReply::Payload(payload)) => Ok(payload),
            Some(ScriptedReply::Failure(message)) => Err(GenerationError::ServiceError(message)),
            Some(ScriptedReply::Events(events)) => {
                let text: String = events
                    .into_iter()
                    .filter_map(|event| match event {
                        GenerationEvent::Content { text } => Some(text),
                        _ => None,
                    })
                    .collect();
                Ok(GenerationPayload::Text(text))
            }
            // 一次性调用等到通道给出 Complete 才返回
            Some(ScriptedReply::Channel(mut rx)) => {
                let mut text = String::new();
                while let Some(event) = rx.recv().await {
                    match event {
                        GenerationEvent::Content { text: fragment } => text.push_str(&fragment),
                        GenerationEvent::Complete { .. } => return Ok(GenerationPayload::Text(text)),
                        GenerationEvent::Error { message } => {
                            return Err(GenerationError::ServiceError(message))
                        }
                    }
                }
                Err(GenerationError::InvalidResponse(
                    "channel closed before completion".to_string(),
                ))
            }
            None => {
                tracing::debug!(target = %request.target, "FakeGenerationClient: placeholder reply");
                Ok(GenerationPayload::Text(placeholder(request)))
            }
        }
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
        match self.next_reply(request) {
            Some(ScriptedReply::Events(events)) => Ok(futures_util::stream::iter(events).boxed()),
            Some(ScriptedReply::Channel(rx)) => {
                let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|event| (event, rx))
                });
                Ok(stream.boxed())
            }
            Some(ScriptedReply::Payload(GenerationPayload::Text(text))) => {
                Ok(futures_util::stream::iter(vec![
                    GenerationEvent::Content { text },
                    GenerationEvent::Complete { word_count: None },
                ])
                .boxed())
            }
            Some(ScriptedReply::Payload(GenerationPayload::Structured(value))) => {
                Ok(futures_util::stream::iter(vec![
                    GenerationEvent::Content {
                        text: value.to_string(),
                    },
                    GenerationEvent::Complete { word_count: None },
                ])
                .boxed())
            }
            Some(ScriptedReply::Failure(message)) => Err(GenerationError::ServiceError(message)),
            None => {
                let text = placeholder(request);
                let delay = self.fragment_delay;
                let mut events: Vec<GenerationEvent> = text
                    .split_inclusive(' ')
                    .map(|word| GenerationEvent::Content {
                        text: word.to_string(),
                    })
                    .collect();
                events.push(GenerationEvent::Complete { word_count: None });

                let stream = futures_util::stream::iter(events).then(move |event| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    event
                });
                Ok(stream.boxed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GenerationTarget, StepNumber, StoryId};

    fn request(kind: ContentKind) -> GenerationRequest {
        GenerationRequest {
            story_id: StoryId::new(),
            target: GenerationTarget::Step(StepNumber::FIRST),
            step_name: "Character summaries".to_string(),
            kind,
            instructions: None,
            context: String::new(),
            current_content: None,
            scene: None,
            writing_style: None,
            previous_chapter_sample: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let client = FakeGenerationClient::new();
        client.push_text("first");
        client.push_error("boom");

        let req = request(ContentKind::FreeText);
        assert_eq!(
            client.invoke(&req).await.unwrap(),
            GenerationPayload::Text("first".to_string())
        );
        assert!(matches!(
            client.invoke(&req).await,
            Err(GenerationError::ServiceError(_))
        ));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_placeholder_stream_ends_with_complete() {
        let client = FakeGenerationClient::new();
        let events: Vec<GenerationEvent> = client
            .stream(&request(ContentKind::StructuredList))
            .await
            .unwrap()
            .collect()
            .await;

        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Complete { .. })
        ));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_channel_reply_completes_invoke() {
        let client = FakeGenerationClient::new();
        let tx = client.push_channel();
        tx.send(GenerationEvent::Content {
            text: "{\"a\":".to_string(),
        })
        .unwrap();
        tx.send(GenerationEvent::Content {
            text: "1}".to_string(),
        })
        .unwrap();
        tx.send(GenerationEvent::Complete { word_count: None }).unwrap();

        assert_eq!(
            client.invoke(&request(ContentKind::Report)).await.unwrap(),
            GenerationPayload::Text("{\"a\":1}".to_string())
        );
    }

    #[tokio::test]
    async fn test_report_placeholder_is_json_object() {
        let client = FakeGenerationClient::new();
        let GenerationPayload::Text(text) = client.invoke(&request(ContentKind::Report)).await.unwrap()
        else {
            panic!("expected text payload");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed["overall_assessment"].is_object());
    }
}
