//! Step Handlers
//!
//! generate / refine 同步完成校验与级联后立即返回尝试编号，生成在后台执行

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{
    AdvanceStep, CancelGeneration, DeliveryMode, GenerateStep, GetGenerationStatus, RefineStep,
    RollbackStep,
};
use crate::domain::{StepNumber, StoryId};
use crate::infrastructure::events::StoryEvent;
use crate::infrastructure::http::dto::{ApiResponse, GenerationAcceptedDto, GenerationStatusDto};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GenerateStepRequest {
    pub story_id: Uuid,
    pub step: u8,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub mode: DeliveryMode,
}

#[derive(Debug, Deserialize)]
pub struct RefineStepRequest {
    pub story_id: Uuid,
    pub step: u8,
    pub instructions: String,
    #[serde(default)]
    pub mode: DeliveryMode,
}

#[derive(Debug, Deserialize)]
pub struct StoryRef {
    pub story_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub story_id: Uuid,
    pub step: u8,
}

#[derive(Debug, Serialize)]
pub struct StepTransitionDto {
    pub story_id: Uuid,
    pub current_step: u8,
    pub removed: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponseDto {
    pub story_id: Uuid,
    pub cancelled_attempt: Option<u64>,
}

fn numbers(steps: &[StepNumber]) -> Vec<u8> {
    steps.iter().map(StepNumber::get).collect()
}

// ============================================================================
// Generate / Refine
// ============================================================================

pub async fn generate_step(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateStepRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let cmd = GenerateStep {
        story_id: StoryId::from_uuid(req.story_id),
        step: StepNumber::new(req.step)?,
        instructions: req.instructions,
        mode: req.mode,
    };

    let prepared = state.step_generation_handler.prepare_generate(cmd).await?;
    let accepted = GenerationAcceptedDto {
        story_id: req.story_id,
        target: format!("step-{}", prepared.step()),
        attempt: prepared.attempt(),
        removed_steps: numbers(prepared.cascaded()),
        removed_chapters: Vec::new(),
    };
    state.runner.spawn_step(prepared);

    Ok(Json(ApiResponse::success(accepted)))
}

pub async fn refine_step(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefineStepRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationAcceptedDto>>, ApiError> {
    let Json(req) = payload?;
    let cmd = RefineStep {
        story_id: StoryId::from_uuid(req.story_id),
        step: StepNumber::new(req.step)?,
        instructions: req.instructions,
        mode: req.mode,
    };

    let prepared = state.step_generation_handler.prepare_refine(cmd).await?;
    let accepted = GenerationAcceptedDto {
        story_id: req.story_id,
        target: format!("step-{}", prepared.step()),
        attempt: prepared.attempt(),
        removed_steps: numbers(prepared.cascaded()),
        removed_chapters: Vec::new(),
    };
    state.runner.spawn_step(prepared);

    Ok(Json(ApiResponse::success(accepted)))
}

// ============================================================================
// Advance / Rollback
// ============================================================================

pub async fn advance_step(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StoryRef>, JsonRejection>,
) -> Result<Json<ApiResponse<StepTransitionDto>>, ApiError> {
    let Json(req) = payload?;
    let result = state
        .advance_step_handler
        .handle(AdvanceStep {
            story_id: StoryId::from_uuid(req.story_id),
        })
        .await?;

    Ok(Json(ApiResponse::success(StepTransitionDto {
        story_id: req.story_id,
        current_step: result.current_step.get(),
        removed: Vec::new(),
    })))
}

pub async fn rollback_step(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RollbackRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StepTransitionDto>>, ApiError> {
    let Json(req) = payload?;
    let result = state
        .rollback_step_handler
        .handle(RollbackStep {
            story_id: StoryId::from_uuid(req.story_id),
            step: StepNumber::new(req.step)?,
        })
        .await?;

    if !result.removed.is_empty() {
        state.event_publisher.publish(StoryEvent::RolledBack {
            story_id: result.story_id,
            current_step: result.current_step,
            removed: result.removed.clone(),
        });
    }

    Ok(Json(ApiResponse::success(StepTransitionDto {
        story_id: req.story_id,
        current_step: result.current_step.get(),
        removed: numbers(&result.removed),
    })))
}

// ============================================================================
// Cancel / Status
// ============================================================================

pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StoryRef>, JsonRejection>,
) -> Result<Json<ApiResponse<CancelResponseDto>>, ApiError> {
    let Json(req) = payload?;
    let result = state.cancel_generation_handler.handle(CancelGeneration {
        story_id: StoryId::from_uuid(req.story_id),
    });

    Ok(Json(ApiResponse::success(CancelResponseDto {
        story_id: req.story_id,
        cancelled_attempt: result.cancelled_attempt,
    })))
}

pub async fn generation_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StoryRef>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationStatusDto>>, ApiError> {
    let Json(req) = payload?;
    let result = state.generation_status_handler.handle(GetGenerationStatus {
        story_id: StoryId::from_uuid(req.story_id),
    });
    Ok(Json(ApiResponse::success(GenerationStatusDto::from(result))))
}
