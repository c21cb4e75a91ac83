//! Generation Client Port - 文本生成服务抽象
//!
//! 两种调用方式：一次性返回完整结果，或返回有序的片段流。
//! 具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ContentKind, GenerationTarget, StoryId};

/// 生成服务错误
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 生成请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub story_id: StoryId,
    pub target: GenerationTarget,
    /// 目标步骤的名称（如 "Plot summary"）
    pub step_name: String,
    /// 期望的内容类型
    pub kind: ContentKind,
    /// 用户的修改意见（精修时必填）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// 原始创意 + 之前所有已提交步骤
    pub context: String,
    /// 精修时的现有内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_content: Option<String>,
    /// 章节对应的场景扩展条目
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writing_style: Option<String>,
    /// 上一章的文风样本
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_chapter_sample: Option<String>,
}

/// 一次性生成结果
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationPayload {
    /// 原始文本（结构化步骤可能包裹在 ```json 代码块中）
    Text(String),
    /// 已解析的结构化数据
    Structured(Value),
}

/// 流式生成事件
///
/// 线上格式为一行一个 JSON 对象：
/// `{"type":"content","text":...}` / `{"type":"complete","wordCount":...}` / `{"type":"error","message":...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    Content {
        text: String,
    },
    Complete {
        #[serde(rename = "wordCount", default, skip_serializing_if = "Option::is_none")]
        word_count: Option<usize>,
    },
    Error {
        message: String,
    },
}

/// 有序片段流；流在 Complete 或 Error 之后结束
pub type FragmentStream = BoxStream<'static, GenerationEvent>;

/// Generation Client Port
#[async_trait]
pub trait GenerationClientPort: Send + Sync {
    /// 一次性生成完整内容
    async fn invoke(&self, request: &GenerationRequest)
        -> Result<GenerationPayload, GenerationError>;

    /// 打开片段流
    ///
    /// 建立连接失败时直接返回错误；连接后的失败以 `GenerationEvent::Error` 出现在流中
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError>;

    /// 检查生成服务是否可用
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event: GenerationEvent =
            serde_json::from_str(r#"{"type":"content","text":"Once"}"#).unwrap();
        assert_eq!(
            event,
            GenerationEvent::Content {
                text: "Once".to_string()
            }
        );

        let event: GenerationEvent =
            serde_json::from_str(r#"{"type":"complete","wordCount":812}"#).unwrap();
        assert_eq!(
            event,
            GenerationEvent::Complete {
                word_count: Some(812)
            }
        );

        let event: GenerationEvent = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert_eq!(event, GenerationEvent::Complete { word_count: None });
    }
}
