//! Story Context - 故事限界上下文
//!
//! 职责:
//! - Story 聚合（步骤账本 + 章节表）
//! - 步骤内容与章节草稿实体
//! - 账本不变量错误
//! - 大纲审阅报告

mod aggregate;
mod analysis;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::{Story, StoryParts};
pub use analysis::{
    CharacterAnalysis, CompletenessAnalysis, ConsistencyChecks, OverallAssessment, PovAnalysis,
    Recommendations, SceneImprovement, StoryAnalysis, StructureAnalysis, SubplotAnalysis,
};
pub use entities::{count_words, strip_json_fence, ChapterDraft, ContentTable, StepContent};
pub use errors::LedgerError;
pub use value_objects::{ChapterNumber, GenerationTarget, Slug, StepNumber, StoryId};
