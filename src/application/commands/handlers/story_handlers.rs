//! Story Command Handlers

use std::sync::Arc;

use super::load_story;
use crate::application::commands::{CreateStory, DeleteStory, SetWritingStyle};
use crate::application::engine::WorkflowEngine;
use crate::application::error::ApplicationError;
use crate::application::ports::StoryRepositoryPort;
use crate::domain::{Slug, StepNumber, Story, StoryId};

// ============================================================================
// CreateStory
// ============================================================================

/// 创建故事响应
#[derive(Debug, Clone)]
pub struct CreateStoryResponse {
    pub id: StoryId,
    pub slug: String,
    pub current_step: StepNumber,
}

/// CreateStory Handler
pub struct CreateStoryHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
}

impl CreateStoryHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>) -> Self {
        Self { story_repo }
    }

    pub async fn handle(&self, command: CreateStory) -> Result<CreateStoryResponse, ApplicationError> {
        let slug = Slug::new(&command.slug)?;
        let story = Story::new(slug, command.premise)?;

        self.story_repo.create(&story).await?;

        tracing::info!(
            story_id = %story.id(),
            slug = %story.slug(),
            "Story created"
        );

        Ok(CreateStoryResponse {
            id: story.id(),
            slug: story.slug().to_string(),
            current_step: story.current_step(),
        })
    }
}

// ============================================================================
// DeleteStory
// ============================================================================

/// DeleteStory Handler
pub struct DeleteStoryHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    engine: Arc<WorkflowEngine>,
}

impl DeleteStoryHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, engine: Arc<WorkflowEngine>) -> Self {
        Self { story_repo, engine }
    }

    pub async fn handle(&self, command: DeleteStory) -> Result<(), ApplicationError> {
        self.engine.ensure_idle(command.story_id)?;
        let story = load_story(self.story_repo.as_ref(), command.story_id).await?;

        self.story_repo.delete(story.id()).await?;

        tracing::info!(story_id = %story.id(), slug = %story.slug(), "Story deleted");
        Ok(())
    }
}

// ============================================================================
// SetWritingStyle
// ============================================================================

/// SetWritingStyle Handler
pub struct SetWritingStyleHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    engine: Arc<WorkflowEngine>,
}

impl SetWritingStyleHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, engine: Arc<WorkflowEngine>) -> Self {
        Self { story_repo, engine }
    }

    /// 返回规范化后的文风
    pub async fn handle(&self, command: SetWritingStyle) -> Result<Option<String>, ApplicationError> {
        self.engine.ensure_idle(command.story_id)?;
        let mut story = load_story(self.story_repo.as_ref(), command.story_id).await?;

        story.set_writing_style(command.style);
        self.story_repo.save(&story).await?;

        tracing::debug!(
            story_id = %story.id(),
            writing_style = ?story.writing_style(),
            "Writing style updated"
        );
        Ok(story.writing_style().map(str::to_string))
    }
}
