//! Chapter Sequencer - 终止步骤的逐章起草
//!
//! 章节只能按顺序生成；精修只针对前沿章节；重新生成第 k 章会先删除其后所有章节。
//! 章节一律流式回放。

use std::sync::Arc;

use super::playback::{PlaybackObserver, PlaybackOutcome, StreamPlayback};
use super::task::GenerationTask;
use super::workflow::WorkflowEngine;
use crate::application::error::ApplicationError;
use crate::application::ports::GenerationRequest;
use crate::domain::{
    schema, ChapterDraft, ChapterNumber, GenerationTarget, LedgerError, StepNumber, Story,
};

/// 已通过校验、持有单飞登记的章节生成作业
#[derive(Debug)]
pub struct ChapterJob {
    task: GenerationTask,
    chapter: ChapterNumber,
    request: GenerationRequest,
    truncated: Vec<ChapterNumber>,
}

impl ChapterJob {
    pub fn chapter(&self) -> ChapterNumber {
        self.chapter
    }

    pub fn attempt(&self) -> u64 {
        self.task.attempt()
    }

    /// 重新生成前被删除的后续章节
    pub fn truncated(&self) -> &[ChapterNumber] {
        &self.truncated
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }
}

/// 章节生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    Committed {
        chapter: ChapterNumber,
        word_count: usize,
        attempt: u64,
    },
    Cancelled {
        chapter: ChapterNumber,
        attempt: u64,
    },
}

/// 章节编排器
pub struct ChapterSequencer {
    engine: Arc<WorkflowEngine>,
}

impl ChapterSequencer {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// 准备生成第 k 章
    ///
    /// k 为前沿的下一章时是新章节；k 为前沿章节时原地重写，不删除任何章节
    pub fn prepare_generate(
        &self,
        story: &Story,
        chapter: ChapterNumber,
    ) -> Result<ChapterJob, ApplicationError> {
        story.ensure_chapter_stage()?;
        let frontier = story.frontier_chapter();
        if chapter.get() > frontier + 1 {
            return Err(LedgerError::ChapterOutOfOrder { chapter, frontier }.into());
        }
        if chapter.get() < frontier {
            return Err(LedgerError::NotFrontierChapter { chapter, frontier }.into());
        }
        // 章节与步骤 9 的场景条目一一对应
        if let Some(planned) = story.planned_chapters() {
            if chapter.get() as usize > planned {
                return Err(LedgerError::UnknownChapter(chapter.get()).into());
            }
        }

        let task = self.begin(story, chapter)?;
        let request = Self::build_request(story, chapter, None, None);
        tracing::info!(
            story_id = %story.id(),
            chapter = %chapter,
            attempt = task.attempt(),
            "Chapter generation prepared"
        );
        Ok(ChapterJob {
            task,
            chapter,
            request,
            truncated: Vec::new(),
        })
    }

    /// 准备精修前沿章节
    pub fn prepare_refine(
        &self,
        story: &Story,
        chapter: ChapterNumber,
        instructions: String,
    ) -> Result<ChapterJob, ApplicationError> {
        let instructions = instructions.trim().to_string();
        if instructions.is_empty() {
            return Err(ApplicationError::validation(
                "refine instructions cannot be empty",
            ));
        }
        story.ensure_chapter_stage()?;
        let frontier = story.frontier_chapter();
        if chapter.get() != frontier {
            return Err(LedgerError::NotFrontierChapter { chapter, frontier }.into());
        }
        let current = story
            .chapter(chapter)
            .map(|draft| draft.content().to_string())
            .ok_or(LedgerError::UnknownChapter(chapter.get()))?;

        let task = self.begin(story, chapter)?;
        let request = Self::build_request(story, chapter, Some(instructions), Some(current));
        tracing::info!(
            story_id = %story.id(),
            chapter = %chapter,
            attempt = task.attempt(),
            "Chapter refine prepared"
        );
        Ok(ChapterJob {
            task,
            chapter,
            request,
            truncated: Vec::new(),
        })
    }

    /// 准备重新生成第 k 章：先删除 k 之后的所有章节
    pub fn prepare_regenerate(
        &self,
        story: &mut Story,
        chapter: ChapterNumber,
    ) -> Result<ChapterJob, ApplicationError> {
        story.ensure_chapter_stage()?;
        let frontier = story.frontier_chapter();
        if chapter.get() > frontier {
            return Err(LedgerError::ChapterOutOfOrder { chapter, frontier }.into());
        }

        let task = self.begin(story, chapter)?;
        let truncated = story.truncate_chapters_after(chapter);
        let request = Self::build_request(story, chapter, None, None);
        tracing::info!(
            story_id = %story.id(),
            chapter = %chapter,
            attempt = task.attempt(),
            truncated = ?truncated,
            "Chapter regenerate prepared"
        );
        Ok(ChapterJob {
            task,
            chapter,
            request,
            truncated,
        })
    }

    fn begin(
        &self,
        story: &Story,
        chapter: ChapterNumber,
    ) -> Result<GenerationTask, ApplicationError> {
        GenerationTask::begin(
            self.engine.flights(),
            story.id(),
            GenerationTarget::Chapter(chapter),
        )
    }

    fn build_request(
        story: &Story,
        chapter: ChapterNumber,
        instructions: Option<String>,
        current_content: Option<String>,
    ) -> GenerationRequest {
        let slot = schema::slot(StepNumber::FINAL);
        GenerationRequest {
            story_id: story.id(),
            target: GenerationTarget::Chapter(chapter),
            step_name: slot.name.to_string(),
            kind: slot.kind,
            instructions,
            context: story.context_up_to(StepNumber::FINAL),
            current_content,
            scene: story.scene_for_chapter(chapter).cloned(),
            writing_style: story.writing_style().map(str::to_string),
            previous_chapter_sample: chapter
                .prev()
                .and_then(|prev| story.chapter(prev))
                .map(ChapterDraft::style_sample),
        }
    }

    /// 流式生成章节并提交
    ///
    /// 调用方持有 `job` 直到提交结果持久化
    pub async fn run(
        &self,
        story: &mut Story,
        job: &ChapterJob,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<ChapterOutcome, ApplicationError> {
        let ChapterJob {
            task,
            chapter,
            request,
            ..
        } = job;
        let (chapter, attempt) = (*chapter, task.attempt());

        let stream = self.engine.open_stream(request).await?;
        let outcome = StreamPlayback::new(task, observer)
            .run(stream, |text| -> Result<usize, ApplicationError> {
                let draft = ChapterDraft::new(text.text).map_err(|e| {
                    ApplicationError::generation_failed(e.to_string())
                })?;
                let word_count = draft.word_count();
                story.commit_chapter(chapter, draft)?;
                Ok(word_count)
            })
            .await;

        match outcome {
            PlaybackOutcome::Finalized(result) => {
                let word_count = result?;
                tracing::info!(
                    story_id = %story.id(),
                    chapter = %chapter,
                    word_count = word_count,
                    attempt = attempt,
                    "Chapter committed"
                );
                Ok(ChapterOutcome::Committed {
                    chapter,
                    word_count,
                    attempt,
                })
            }
            PlaybackOutcome::Cancelled { .. } => Ok(ChapterOutcome::Cancelled { chapter, attempt }),
            PlaybackOutcome::Failed { message, displayed } => Err(ApplicationError::GenerationFailed {
                message,
                partial: Some(displayed),
            }),
        }
    }

    /// GenerateChapter(story, k)
    pub async fn generate_chapter(
        &self,
        story: &mut Story,
        chapter: ChapterNumber,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<ChapterOutcome, ApplicationError> {
        let job = self.prepare_generate(story, chapter)?;
        self.run(story, &job, observer).await
    }

    /// RefineChapter(story, k, instructions)
    pub async fn refine_chapter(
        &self,
        story: &mut Story,
        chapter: ChapterNumber,
        instructions: String,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<ChapterOutcome, ApplicationError> {
        let job = self.prepare_refine(story, chapter, instructions)?;
        self.run(story, &job, observer).await
    }

    /// RegenerateChapter(story, k)
    pub async fn regenerate_chapter(
        &self,
        story: &mut Story,
        chapter: ChapterNumber,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<ChapterOutcome, ApplicationError> {
        let job = self.prepare_regenerate(story, chapter)?;
        self.run(story, &job, observer).await
    }
}
