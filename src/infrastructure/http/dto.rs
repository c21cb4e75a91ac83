//! Data Transfer Objects

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::application::{
    FlightSnapshot, GenerationStatusResponse, StoryResponse, StorySummaryResponse,
};
use crate::domain::StepContent;

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

/// 空数据响应
#[derive(Debug, Serialize)]
pub struct Empty {}

impl ApiResponse<Empty> {
    /// 成功但无数据
    pub fn ok() -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(Empty {}),
        }
    }
}

// ============================================================================
// Story DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StepDto {
    pub number: u8,
    pub name: &'static str,
    pub kind: &'static str,
    /// 文本为字符串，列表与表格为 JSON
    pub content: Option<Value>,
    /// 可读的渲染文本
    pub rendered: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Serialize)]
pub struct ChapterDto {
    pub number: u32,
    pub content: String,
    pub word_count: usize,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct StoryDto {
    pub id: Uuid,
    pub slug: String,
    pub premise: String,
    pub current_step: u8,
    pub steps: Vec<StepDto>,
    pub chapters: Vec<ChapterDto>,
    pub frontier_chapter: u32,
    pub planned_chapters: Option<usize>,
    pub total_words: usize,
    pub writing_style: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn content_value(content: &StepContent) -> Value {
    match content {
        StepContent::Text(text) => Value::String(text.clone()),
        StepContent::List(items) => Value::Array(items.clone()),
        StepContent::Table(table) => serde_json::to_value(table).unwrap_or(Value::Null),
    }
}

impl From<StoryResponse> for StoryDto {
    fn from(story: StoryResponse) -> Self {
        Self {
            id: *story.id.as_uuid(),
            slug: story.slug,
            premise: story.premise,
            current_step: story.current_step.get(),
            steps: story
                .steps
                .into_iter()
                .map(|s| StepDto {
                    number: s.number.get(),
                    name: s.name,
                    kind: s.kind.as_str(),
                    rendered: s.content.as_ref().map(StepContent::render),
                    content: s.content.as_ref().map(content_value),
                    is_current: s.is_current,
                })
                .collect(),
            chapters: story
                .chapters
                .into_iter()
                .map(|c| ChapterDto {
                    number: c.number.get(),
                    content: c.content,
                    word_count: c.word_count,
                    generated_at: c.generated_at,
                })
                .collect(),
            frontier_chapter: story.frontier_chapter,
            planned_chapters: story.planned_chapters,
            total_words: story.total_words,
            writing_style: story.writing_style,
            created_at: story.created_at,
            updated_at: story.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StorySummaryDto {
    pub id: Uuid,
    pub slug: String,
    pub premise: String,
    pub current_step: u8,
    pub frontier_chapter: u32,
    pub updated_at: String,
}

impl From<StorySummaryResponse> for StorySummaryDto {
    fn from(s: StorySummaryResponse) -> Self {
        Self {
            id: *s.id.as_uuid(),
            slug: s.slug,
            premise: s.premise,
            current_step: s.current_step.get(),
            frontier_chapter: s.frontier_chapter,
            updated_at: s.updated_at,
        }
    }
}

// ============================================================================
// Generation DTOs
// ============================================================================

/// 生成已受理，结果通过 WS 推送
#[derive(Debug, Serialize)]
pub struct GenerationAcceptedDto {
    pub story_id: Uuid,
    /// "step-N" / "chapter-N" / "analysis"
    pub target: String,
    pub attempt: u64,
    /// 精修级联删除的步骤
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_steps: Vec<u8>,
    /// 重新生成删除的章节
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_chapters: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActiveGenerationDto {
    pub target: String,
    pub attempt: u64,
    pub cancelled: bool,
    pub started_at: String,
    pub displayed_chars: usize,
    pub received_chars: usize,
    pub stream_closed: bool,
}

impl From<FlightSnapshot> for ActiveGenerationDto {
    fn from(s: FlightSnapshot) -> Self {
        Self {
            target: s.target.to_string(),
            attempt: s.attempt,
            cancelled: s.cancelled,
            started_at: s.started_at.to_rfc3339(),
            displayed_chars: s.progress.displayed_chars,
            received_chars: s.progress.received_chars,
            stream_closed: s.progress.stream_closed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationStatusDto {
    pub story_id: Uuid,
    /// "idle" | "generating"
    pub state: &'static str,
    pub active: Option<ActiveGenerationDto>,
}

impl From<GenerationStatusResponse> for GenerationStatusDto {
    fn from(r: GenerationStatusResponse) -> Self {
        let active = r.active.filter(|s| !s.cancelled);
        Self {
            story_id: *r.story_id.as_uuid(),
            state: if active.is_some() { "generating" } else { "idle" },
            active: active.map(ActiveGenerationDto::from),
        }
    }
}
