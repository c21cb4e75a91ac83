//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Engine
    ChapterSequencer, StoryAnalyst, WorkflowEngine,
    // Command handlers
    AdvanceStepHandler, AnalyzeStoryHandler, CancelGenerationHandler, ChapterGenerationHandler, CreateStoryHandler,
    DeleteStoryHandler, RollbackStepHandler, SetWritingStyleHandler, StepGenerationHandler,
    // Query handlers
    GetGenerationStatusHandler, GetStoryBySlugHandler, GetStoryHandler, ListStoriesHandler,
    // Ports
    FlightRegistryPort, GenerationClientPort, StoryRepositoryPort,
};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::worker::{GenerationRunner, GenerationRunnerConfig};

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub story_repo: Arc<dyn StoryRepositoryPort>,
    pub generation_client: Arc<dyn GenerationClientPort>,
    pub flights: Arc<dyn FlightRegistryPort>,
    pub event_publisher: Arc<EventPublisher>,
    pub runner: GenerationRunner,

    // ========== Command Handlers ==========
    pub create_story_handler: CreateStoryHandler,
    pub delete_story_handler: DeleteStoryHandler,
    pub set_writing_style_handler: SetWritingStyleHandler,
    pub advance_step_handler: AdvanceStepHandler,
    pub rollback_step_handler: RollbackStepHandler,
    pub cancel_generation_handler: CancelGenerationHandler,
    pub step_generation_handler: Arc<StepGenerationHandler>,
    pub chapter_generation_handler: Arc<ChapterGenerationHandler>,
    pub analyze_story_handler: Arc<AnalyzeStoryHandler>,

    // ========== Query Handlers ==========
    pub get_story_handler: GetStoryHandler,
    pub get_story_by_slug_handler: GetStoryBySlugHandler,
    pub list_stories_handler: ListStoriesHandler,
    pub generation_status_handler: GetGenerationStatusHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        story_repo: Arc<dyn StoryRepositoryPort>,
        generation_client: Arc<dyn GenerationClientPort>,
        flights: Arc<dyn FlightRegistryPort>,
        event_publisher: Arc<EventPublisher>,
        runner_config: GenerationRunnerConfig,
    ) -> Self {
        let engine = Arc::new(WorkflowEngine::new(generation_client.clone(), flights.clone()));
        let sequencer = Arc::new(ChapterSequencer::new(engine.clone()));

        let step_generation_handler =
            Arc::new(StepGenerationHandler::new(story_repo.clone(), engine.clone()));
        let chapter_generation_handler =
            Arc::new(ChapterGenerationHandler::new(story_repo.clone(), sequencer));
        let analyze_story_handler = Arc::new(AnalyzeStoryHandler::new(
            story_repo.clone(),
            Arc::new(StoryAnalyst::new(engine.clone())),
        ));

        let runner = GenerationRunner::new(
            runner_config,
            step_generation_handler.clone(),
            chapter_generation_handler.clone(),
            analyze_story_handler.clone(),
            event_publisher.clone(),
        );

        Self {
            // Ports
            story_repo: story_repo.clone(),
            generation_client,
            flights: flights.clone(),
            event_publisher,
            runner,

            // Command handlers
            create_story_handler: CreateStoryHandler::new(story_repo.clone()),
            delete_story_handler: DeleteStoryHandler::new(story_repo.clone(), engine.clone()),
            set_writing_style_handler: SetWritingStyleHandler::new(
                story_repo.clone(),
                engine.clone(),
            ),
            advance_step_handler: AdvanceStepHandler::new(story_repo.clone(), engine.clone()),
            rollback_step_handler: RollbackStepHandler::new(story_repo.clone(), engine.clone()),
            cancel_generation_handler: CancelGenerationHandler::new(engine),
            step_generation_handler,
            chapter_generation_handler,
            analyze_story_handler,

            // Query handlers
            get_story_handler: GetStoryHandler::new(story_repo.clone()),
            get_story_by_slug_handler: GetStoryBySlugHandler::new(story_repo.clone()),
            list_stories_handler: ListStoriesHandler::new(story_repo),
            generation_status_handler: GetGenerationStatusHandler::new(flights),
        }
    }
}
