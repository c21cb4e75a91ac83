//! Generation Runner - Background Generation Processor

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::application::{
    AnalysisOutcome, AnalyzeStoryHandler, ApplicationError, ChapterGenerationHandler,
    ChapterOutcome, PreparedAnalysis, PreparedChapter, PreparedStep, StepGenerationHandler,
    StepOutcome,
};
use crate::domain::{GenerationTarget, StoryId};
use crate::infrastructure::events::{EventPublisher, PublishingObserver, StoryEvent};

/// Runner 配置
#[derive(Debug, Clone)]
pub struct GenerationRunnerConfig {
    /// 最大并发生成数（跨故事）
    pub max_concurrent: usize,
    /// 回放进度事件合并的字符数
    pub progress_batch: usize,
}

impl Default for GenerationRunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            progress_batch: 8,
        }
    }
}

/// 生成 Runner
///
/// 接收已准备好的生成，在后台执行并把结果发布为故事事件
pub struct GenerationRunner {
    config: GenerationRunnerConfig,
    step_handler: Arc<StepGenerationHandler>,
    chapter_handler: Arc<ChapterGenerationHandler>,
    analysis_handler: Arc<AnalyzeStoryHandler>,
    event_publisher: Arc<EventPublisher>,
    semaphore: Arc<Semaphore>,
}

impl GenerationRunner {
    pub fn new(
        config: GenerationRunnerConfig,
        step_handler: Arc<StepGenerationHandler>,
        chapter_handler: Arc<ChapterGenerationHandler>,
        analysis_handler: Arc<AnalyzeStoryHandler>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            step_handler,
            chapter_handler,
            analysis_handler,
            event_publisher,
            semaphore,
        }
    }

    /// 在后台执行步骤生成
    pub fn spawn_step(&self, prepared: PreparedStep) -> JoinHandle<()> {
        let story_id = prepared.story_id();
        let step = prepared.step();
        let attempt = prepared.attempt();
        let target = GenerationTarget::Step(step);

        if !prepared.cascaded().is_empty() {
            self.event_publisher.publish(StoryEvent::RolledBack {
                story_id,
                current_step: step,
                removed: prepared.cascaded().to_vec(),
            });
        }
        self.event_publisher.publish(StoryEvent::GenerationStarted {
            story_id,
            target,
            attempt,
        });

        let handler = self.step_handler.clone();
        let publisher = self.event_publisher.clone();
        let semaphore = self.semaphore.clone();
        let batch = self.config.progress_batch;

        tokio::spawn(async move {
            // 持有 permit 直到生成结束
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(story_id = %story_id, "Generation runner is shut down");
                    return;
                }
            };

            let mut observer = PublishingObserver::new(publisher.clone(), story_id, attempt, batch);
            let event = match handler.run(prepared, &mut observer).await {
                Ok(StepOutcome::Committed {
                    step, current_step, ..
                }) => StoryEvent::StepCommitted {
                    story_id,
                    step,
                    current_step,
                    attempt,
                },
                Ok(StepOutcome::Cancelled { .. }) => StoryEvent::GenerationCancelled {
                    story_id,
                    target,
                    attempt,
                },
                Err(e) => failure_event(story_id, target, attempt, e),
            };
            publisher.publish(event);
        })
    }

    /// 在后台执行章节生成
    pub fn spawn_chapter(&self, prepared: PreparedChapter) -> JoinHandle<()> {
        let story_id = prepared.story_id();
        let attempt = prepared.attempt();
        let target = GenerationTarget::Chapter(prepared.chapter());

        if !prepared.truncated().is_empty() {
            self.event_publisher.publish(StoryEvent::ChaptersTruncated {
                story_id,
                removed: prepared.truncated().to_vec(),
            });
        }
        self.event_publisher.publish(StoryEvent::GenerationStarted {
            story_id,
            target,
            attempt,
        });

        let handler = self.chapter_handler.clone();
        let publisher = self.event_publisher.clone();
        let semaphore = self.semaphore.clone();
        let batch = self.config.progress_batch;

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(story_id = %story_id, "Generation runner is shut down");
                    return;
                }
            };

            let mut observer = PublishingObserver::new(publisher.clone(), story_id, attempt, batch);
            let event = match handler.run(prepared, &mut observer).await {
                Ok(ChapterOutcome::Committed {
                    chapter,
                    word_count,
                    ..
                }) => StoryEvent::ChapterCommitted {
                    story_id,
                    chapter,
                    word_count,
                    attempt,
                },
                Ok(ChapterOutcome::Cancelled { .. }) => StoryEvent::GenerationCancelled {
                    story_id,
                    target,
                    attempt,
                },
                Err(e) => failure_event(story_id, target, attempt, e),
            };
            publisher.publish(event);
        })
    }

    /// 在后台执行大纲审阅，报告以事件发布
    pub fn spawn_analysis(&self, prepared: PreparedAnalysis) -> JoinHandle<()> {
        let story_id = prepared.story_id();
        let attempt = prepared.attempt();
        let target = GenerationTarget::Analysis;

        self.event_publisher.publish(StoryEvent::GenerationStarted {
            story_id,
            target,
            attempt,
        });

        let handler = self.analysis_handler.clone();
        let publisher = self.event_publisher.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(story_id = %story_id, "Generation runner is shut down");
                    return;
                }
            };

            let event = match handler.run(prepared).await {
                Ok(AnalysisOutcome::Completed { analysis, .. }) => StoryEvent::AnalysisCompleted {
                    story_id,
                    attempt,
                    analysis: Box::new(analysis),
                },
                Ok(AnalysisOutcome::Cancelled { .. }) => StoryEvent::GenerationCancelled {
                    story_id,
                    target,
                    attempt,
                },
                Err(e) => failure_event(story_id, target, attempt, e),
            };
            publisher.publish(event);
        })
    }
}

fn failure_event(
    story_id: StoryId,
    target: GenerationTarget,
    attempt: u64,
    error: ApplicationError,
) -> StoryEvent {
    tracing::warn!(
        story_id = %story_id,
        target = %target,
        attempt = attempt,
        error = %error,
        "Generation did not commit"
    );
    let partial = match &error {
        ApplicationError::GenerationFailed { partial, .. } => partial.clone(),
        _ => None,
    };
    StoryEvent::GenerationFailed {
        story_id,
        target,
        attempt,
        error: error.to_string(),
        partial,
    }
}
