//! Story Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{FlightRegistryPort, FlightSnapshot, StoryRepositoryPort};
use crate::application::queries::{GetGenerationStatus, GetStory, GetStoryBySlug, ListStories};
use crate::domain::{
    schema, ChapterNumber, ContentKind, Slug, StepContent, StepNumber, Story, StoryId,
};

// ============================================================================
// Response DTOs
// ============================================================================

/// 步骤槽位响应
#[derive(Debug, Clone)]
pub struct StepResponse {
    pub number: StepNumber,
    pub name: &'static str,
    pub kind: ContentKind,
    pub content: Option<StepContent>,
    pub is_current: bool,
}

/// 章节响应
#[derive(Debug, Clone)]
pub struct ChapterResponse {
    pub number: ChapterNumber,
    pub content: String,
    pub word_count: usize,
    pub generated_at: String,
}

/// 故事详情响应
#[derive(Debug, Clone)]
pub struct StoryResponse {
    pub id: StoryId,
    pub slug: String,
    pub premise: String,
    pub current_step: StepNumber,
    pub steps: Vec<StepResponse>,
    pub chapters: Vec<ChapterResponse>,
    pub frontier_chapter: u32,
    /// 步骤 9 中的场景条目数
    pub planned_chapters: Option<usize>,
    pub total_words: usize,
    pub writing_style: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Story> for StoryResponse {
    fn from(story: Story) -> Self {
        let current = story.current_step();
        let steps = schema::slots()
            .iter()
            .map(|slot| {
                let number = slot.step();
                StepResponse {
                    number,
                    name: slot.name,
                    kind: slot.kind,
                    content: story.peek(number).cloned(),
                    is_current: number == current,
                }
            })
            .collect();
        let chapters: Vec<ChapterResponse> = story
            .chapters()
            .iter()
            .map(|(number, draft)| ChapterResponse {
                number: *number,
                content: draft.content().to_string(),
                word_count: draft.word_count(),
                generated_at: draft.generated_at().to_rfc3339(),
            })
            .collect();

        Self {
            id: story.id(),
            slug: story.slug().to_string(),
            premise: story.premise().to_string(),
            current_step: current,
            total_words: chapters.iter().map(|c| c.word_count).sum(),
            steps,
            chapters,
            frontier_chapter: story.frontier_chapter(),
            planned_chapters: story.planned_chapters(),
            writing_style: story.writing_style().map(str::to_string),
            created_at: story.created_at().to_rfc3339(),
            updated_at: story.updated_at().to_rfc3339(),
        }
    }
}

/// 故事列表项响应
#[derive(Debug, Clone)]
pub struct StorySummaryResponse {
    pub id: StoryId,
    pub slug: String,
    pub premise: String,
    pub current_step: StepNumber,
    pub frontier_chapter: u32,
    pub updated_at: String,
}

impl From<Story> for StorySummaryResponse {
    fn from(story: Story) -> Self {
        Self {
            id: story.id(),
            slug: story.slug().to_string(),
            premise: story.premise().to_string(),
            current_step: story.current_step(),
            frontier_chapter: story.frontier_chapter(),
            updated_at: story.updated_at().to_rfc3339(),
        }
    }
}

/// 生成状态响应
#[derive(Debug, Clone)]
pub struct GenerationStatusResponse {
    pub story_id: StoryId,
    pub active: Option<FlightSnapshot>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GetStory Handler
pub struct GetStoryHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
}

impl GetStoryHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>) -> Self {
        Self { story_repo }
    }

    pub async fn handle(&self, query: GetStory) -> Result<StoryResponse, ApplicationError> {
        let story = self
            .story_repo
            .find_by_id(query.story_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Story", query.story_id))?;

        Ok(StoryResponse::from(story))
    }
}

/// GetStoryBySlug Handler
pub struct GetStoryBySlugHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
}

impl GetStoryBySlugHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>) -> Self {
        Self { story_repo }
    }

    pub async fn handle(&self, query: GetStoryBySlug) -> Result<StoryResponse, ApplicationError> {
        let slug = Slug::new(&query.slug)?;
        let story = self
            .story_repo
            .find_by_slug(&slug)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Story", &slug))?;

        Ok(StoryResponse::from(story))
    }
}

/// ListStories Handler
pub struct ListStoriesHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
}

impl ListStoriesHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>) -> Self {
        Self { story_repo }
    }

    pub async fn handle(&self, _query: ListStories) -> Result<Vec<StorySummaryResponse>, ApplicationError> {
        let stories = self.story_repo.find_all().await?;
        Ok(stories.into_iter().map(StorySummaryResponse::from).collect())
    }
}

/// GetGenerationStatus Handler
pub struct GetGenerationStatusHandler {
    flights: Arc<dyn FlightRegistryPort>,
}

impl GetGenerationStatusHandler {
    pub fn new(flights: Arc<dyn FlightRegistryPort>) -> Self {
        Self { flights }
    }

    pub fn handle(&self, query: GetGenerationStatus) -> GenerationStatusResponse {
        GenerationStatusResponse {
            story_id: query.story_id,
            active: self.flights.snapshot(query.story_id),
        }
    }
}
