//! Domain Layer - 领域层
//!
//! - Story Context: 故事与步骤账本
//! - Schema: 固定的十步大纲定义

pub mod schema;
pub mod story;

pub use schema::{ContentKind, StepSlot, STEP_COUNT};
pub use story::{
    count_words, ChapterDraft, ChapterNumber, GenerationTarget, LedgerError, Slug, StepContent, StepNumber,
    Story, StoryAnalysis, StoryId,
};
