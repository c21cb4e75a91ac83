//! Story HTTP Handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{
    AnalyzeStory, CreateStory, DeleteStory, GetStory, GetStoryBySlug, ListStories,
    SetWritingStyle,
};
use crate::domain::{GenerationTarget, StoryId};
use crate::infrastructure::http::dto::{
    ApiResponse, Empty, GenerationAcceptedDto, StoryDto, StorySummaryDto,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    pub slug: String,
    pub premise: String,
}

#[derive(Debug, Serialize)]
pub struct CreateStoryResponseDto {
    pub id: Uuid,
    pub slug: String,
    pub current_step: u8,
}

/// 按 id 或 slug 获取
#[derive(Debug, Deserialize)]
pub struct GetStoryRequest {
    pub id: Option<Uuid>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteStoryRequest {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeStoryRequest {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SetStyleRequest {
    pub id: Uuid,
    /// 缺省或空白表示清除
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StyleResponseDto {
    pub id: Uuid,
    pub writing_style: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// 创建故事
pub async fn create_story(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateStoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CreateStoryResponseDto>>, ApiError> {
    let Json(req) = payload?;
    let result = state
        .create_story_handler
        .handle(CreateStory {
            slug: req.slug,
            premise: req.premise,
        })
        .await?;

    Ok(Json(ApiResponse::success(CreateStoryResponseDto {
        id: *result.id.as_uuid(),
        slug: result.slug,
        current_step: result.current_step.get(),
    })))
}

/// 获取故事详情
pub async fn get_story(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GetStoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StoryDto>>, ApiError> {
    let Json(req) = payload?;
    let result = match (req.id, req.slug) {
        (Some(id), _) => {
            state
                .get_story_handler
                .handle(GetStory {
                    story_id: StoryId::from_uuid(id),
                })
                .await?
        }
        (None, Some(slug)) => {
            state
                .get_story_by_slug_handler
                .handle(GetStoryBySlug { slug })
                .await?
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either id or slug is required".to_string(),
            ))
        }
    };

    Ok(Json(ApiResponse::success(StoryDto::from(result))))
}

/// 获取故事列表
pub async fn list_stories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StorySummaryDto>>>, ApiError> {
    let result = state.list_stories_handler.handle(ListStories).await?;
    let stories = result.into_iter().map(StorySummaryDto::from).collect();
    Ok(Json(ApiResponse::success(stories)))
}

/// 删除故事
pub async fn delete_story(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteStoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let Json(req) = payload?;
    let story_id = StoryId::from_uuid(req.id);
    state
        .delete_story_handler
        .handle(DeleteStory { story_id })
        .await?;

    state.event_publisher.publish_story_deleted(story_id);
    Ok(Json(ApiResponse::ok()))
}

/// 设置或清除全局文风
pub async fn set_writing_style(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetStyleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StyleResponseDto>>, ApiError> {
    let Json(req) = payload?;
    let writing_style = state
        .set_writing_style_handler
        .handle(SetWritingStyle {
            story_id: StoryId::from_uuid(req.id),
            style: req.style,
        })
        .await?;

    Ok(Json(ApiResponse::success(StyleResponseDto {
        id: req.id,
        writing_style,
    })))
}

/// 审阅大纲（后台执行，报告通过 WS 推送，不写入账本）
pub async fn analyze_story(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeStoryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let prepared = state
        .analyze_story_handler
        .prepare(AnalyzeStory {
            story_id: StoryId::from_uuid(req.id),
        })
        .await?;

    let accepted = GenerationAcceptedDto {
        story_id: req.id,
        target: GenerationTarget::Analysis.to_string(),
        attempt: prepared.attempt(),
        removed_steps: Vec::new(),
        removed_chapters: Vec::new(),
    };
    state.runner.spawn_analysis(prepared);
    Ok(Json(ApiResponse::success(accepted)))
}
