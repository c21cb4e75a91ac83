//! Chapter Handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{GenerateChapter, PreparedChapter, RefineChapter, RegenerateChapter};
use crate::domain::{ChapterNumber, StoryId};
use crate::infrastructure::http::dto::{ApiResponse, GenerationAcceptedDto};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChapterRequest {
    pub story_id: Uuid,
    pub chapter: u32,
}

#[derive(Debug, Deserialize)]
pub struct RefineChapterRequest {
    pub story_id: Uuid,
    pub chapter: u32,
    pub instructions: String,
}

/// 交给后台执行并返回受理结果
fn accept(state: &AppState, prepared: PreparedChapter) -> GenerationAcceptedDto {
    let accepted = GenerationAcceptedDto {
        story_id: *prepared.story_id().as_uuid(),
        target: format!("chapter-{}", prepared.chapter()),
        attempt: prepared.attempt(),
        removed_steps: Vec::new(),
        removed_chapters: prepared.truncated().iter().map(ChapterNumber::get).collect(),
    };
    state.runner.spawn_chapter(prepared);
    accepted
}

pub async fn generate_chapter(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChapterRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let prepared = state
        .chapter_generation_handler
        .prepare_generate(GenerateChapter {
            story_id: StoryId::from_uuid(req.story_id),
            chapter: ChapterNumber::new(req.chapter)?,
        })
        .await?;

    Ok(Json(ApiResponse::success(accept(&state, prepared))))
}

pub async fn refine_chapter(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefineChapterRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let prepared = state
        .chapter_generation_handler
        .prepare_refine(RefineChapter {
            story_id: StoryId::from_uuid(req.story_id),
            chapter: ChapterNumber::new(req.chapter)?,
            instructions: req.instructions,
        })
        .await?;

    Ok(Json(ApiResponse::success(accept(&state, prepared))))
}

pub async fn regenerate_chapter(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChapterRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let prepared = state
        .chapter_generation_handler
        .prepare_regenerate(RegenerateChapter {
            story_id: StoryId::from_uuid(req.story_id),
            chapter: ChapterNumber::new(req.chapter)?,
        })
        .await?;

    Ok(Json(ApiResponse::success(accept(&state, prepared))))
}
