//! Workflow Engine - 生成编排
//!
//! - task: 单次生成尝试（单飞登记 + 协作式取消）
//! - playback: 打字机式流式回放
//! - workflow: 步骤生成、精修、回滚
//! - chapters: 逐章起草
//! - analysis: 大纲审阅（只读）

mod analysis;
mod chapters;
mod playback;
mod task;
mod workflow;

pub use analysis::{AnalysisJob, AnalysisOutcome, StoryAnalyst};
pub use chapters::{ChapterJob, ChapterOutcome, ChapterSequencer};
pub use playback::{
    FinalText, NoopObserver, PlaybackBuffer, PlaybackObserver, PlaybackOutcome, PlaybackState,
    StreamPlayback,
};
pub use task::GenerationTask;
pub use workflow::{Delivery, StepJob, StepOutcome, WorkflowEngine};
