//! Chapter Command Handlers

use std::sync::Arc;

use super::load_story;
use crate::application::commands::{GenerateChapter, RefineChapter, RegenerateChapter};
use crate::application::engine::{ChapterJob, ChapterOutcome, ChapterSequencer, PlaybackObserver};
use crate::application::error::ApplicationError;
use crate::application::ports::StoryRepositoryPort;
use crate::domain::{ChapterNumber, Story, StoryId};

/// 已准备好的章节生成
#[derive(Debug)]
pub struct PreparedChapter {
    story: Story,
    job: ChapterJob,
}

impl PreparedChapter {
    pub fn story_id(&self) -> StoryId {
        self.story.id()
    }

    pub fn chapter(&self) -> ChapterNumber {
        self.job.chapter()
    }

    pub fn attempt(&self) -> u64 {
        self.job.attempt()
    }

    pub fn truncated(&self) -> &[ChapterNumber] {
        self.job.truncated()
    }
}

/// GenerateChapter / RefineChapter / RegenerateChapter Handler
pub struct ChapterGenerationHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    sequencer: Arc<ChapterSequencer>,
}

impl ChapterGenerationHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, sequencer: Arc<ChapterSequencer>) -> Self {
        Self {
            story_repo,
            sequencer,
        }
    }

    pub async fn prepare_generate(
        &self,
        command: GenerateChapter,
    ) -> Result<PreparedChapter, ApplicationError> {
        let story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self.sequencer.prepare_generate(&story, command.chapter)?;
        Ok(PreparedChapter { story, job })
    }

    pub async fn prepare_refine(
        &self,
        command: RefineChapter,
    ) -> Result<PreparedChapter, ApplicationError> {
        let story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self
            .sequencer
            .prepare_refine(&story, command.chapter, command.instructions)?;
        Ok(PreparedChapter { story, job })
    }

    /// 校验、登记并持久化章节截断
    pub async fn prepare_regenerate(
        &self,
        command: RegenerateChapter,
    ) -> Result<PreparedChapter, ApplicationError> {
        let mut story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self.sequencer.prepare_regenerate(&mut story, command.chapter)?;
        if !job.truncated().is_empty() {
            self.story_repo.save(&story).await?;
        }
        Ok(PreparedChapter { story, job })
    }

    /// 执行生成并保存提交结果；保存完成后才释放单飞登记
    pub async fn run(
        &self,
        prepared: PreparedChapter,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<ChapterOutcome, ApplicationError> {
        let PreparedChapter { mut story, job } = prepared;

        let outcome = self.sequencer.run(&mut story, &job, observer).await?;
        if let ChapterOutcome::Committed { chapter, .. } = outcome {
            self.story_repo.save(&story).await.map_err(|e| {
                tracing::error!(
                    story_id = %story.id(),
                    chapter = %chapter,
                    error = %e,
                    "Failed to persist committed chapter"
                );
                ApplicationError::from(e)
            })?;
        }
        drop(job);
        Ok(outcome)
    }
}
