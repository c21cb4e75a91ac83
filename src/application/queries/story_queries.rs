//! Story Queries

use crate::domain::StoryId;

/// 获取故事详情查询
#[derive(Debug, Clone)]
pub struct GetStory {
    pub story_id: StoryId,
}

/// 根据 slug 获取故事查询
#[derive(Debug, Clone)]
pub struct GetStoryBySlug {
    pub slug: String,
}

/// 列出所有故事查询
#[derive(Debug, Clone)]
pub struct ListStories;

/// 获取生成状态查询
#[derive(Debug, Clone)]
pub struct GetGenerationStatus {
    pub story_id: StoryId,
}
