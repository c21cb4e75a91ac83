//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod analysis_handlers;
mod chapter_handlers;
mod step_handlers;
mod story_handlers;

pub use analysis_handlers::*;
pub use chapter_handlers::*;
pub use step_handlers::*;
pub use story_handlers::*;

use crate::application::error::ApplicationError;
use crate::application::ports::StoryRepositoryPort;
use crate::domain::{Story, StoryId};

/// 加载故事，不存在时返回 NotFound
pub(crate) async fn load_story(
    repo: &dyn StoryRepositoryPort,
    story_id: StoryId,
) -> Result<Story, ApplicationError> {
    repo.find_by_id(story_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Story", story_id))
}
