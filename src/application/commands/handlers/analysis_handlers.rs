//! Analysis Command Handlers

use std::sync::Arc;

use super::load_story;
use crate::application::commands::AnalyzeStory;
use crate::application::engine::{AnalysisJob, AnalysisOutcome, StoryAnalyst};
use crate::application::error::ApplicationError;
use crate::application::ports::StoryRepositoryPort;
use crate::domain::StoryId;

/// 已准备好的大纲审阅
#[derive(Debug)]
pub struct PreparedAnalysis {
    story_id: StoryId,
    job: AnalysisJob,
}

impl PreparedAnalysis {
    pub fn story_id(&self) -> StoryId {
        self.story_id
    }

    pub fn attempt(&self) -> u64 {
        self.job.attempt()
    }
}

/// AnalyzeStory Handler
///
/// 不保存任何内容；报告由调用方返回或发布
pub struct AnalyzeStoryHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    analyst: Arc<StoryAnalyst>,
}

impl AnalyzeStoryHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, analyst: Arc<StoryAnalyst>) -> Self {
        Self {
            story_repo,
            analyst,
        }
    }

    pub async fn prepare(&self, command: AnalyzeStory) -> Result<PreparedAnalysis, ApplicationError> {
        let story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self.analyst.prepare(&story)?;
        Ok(PreparedAnalysis {
            story_id: story.id(),
            job,
        })
    }

    pub async fn run(&self, prepared: PreparedAnalysis) -> Result<AnalysisOutcome, ApplicationError> {
        self.analyst.run(&prepared.job).await
    }

    pub async fn handle(&self, command: AnalyzeStory) -> Result<AnalysisOutcome, ApplicationError> {
        let prepared = self.prepare(command).await?;
        self.run(prepared).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::WorkflowEngine;
    use crate::application::ports::FlightRegistryPort;
    use crate::domain::{schema, ContentKind, Slug, StepContent, StepNumber, Story};
    use crate::infrastructure::adapters::FakeGenerationClient;
    use crate::infrastructure::memory::InMemoryFlightRegistry;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteStoryRepository,
    };
    use serde_json::json;

    async fn setup() -> (Arc<dyn StoryRepositoryPort>, AnalyzeStoryHandler) {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo: Arc<dyn StoryRepositoryPort> = Arc::new(SqliteStoryRepository::new(pool));
        let flights: Arc<dyn FlightRegistryPort> = Arc::new(InMemoryFlightRegistry::new());
        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(FakeGenerationClient::new()),
            flights,
        ));
        let handler = AnalyzeStoryHandler::new(repo.clone(), Arc::new(StoryAnalyst::new(engine)));
        (repo, handler)
    }

    fn planned_story() -> Story {
        let mut story = Story::new(Slug::new("tides").unwrap(), "Tides turn").unwrap();
        for n in 1..=9u8 {
            let step = StepNumber::new(n).unwrap();
            let content = match schema::slot(step).kind {
                ContentKind::FreeText => StepContent::Text(format!("step {}", n)),
                kind => StepContent::from_json(kind, json!([{"title": "Scene 1"}])).unwrap(),
            };
            story.commit(step, content).unwrap();
        }
        story
    }

    #[tokio::test]
    async fn test_analysis_leaves_stored_story_unchanged() {
        let (repo, handler) = setup().await;
        let story = planned_story();
        repo.create(&story).await.unwrap();
        let before = serde_json::to_value(repo.find_by_id(story.id()).await.unwrap()).unwrap();

        let outcome = handler
            .handle(AnalyzeStory {
                story_id: story.id(),
            })
            .await
            .unwrap();
        let AnalysisOutcome::Completed { analysis, .. } = outcome else {
            panic!("expected completed analysis, got {:?}", outcome);
        };
        assert_eq!(analysis.overall_assessment.readiness_score, "6/10");

        let after = serde_json::to_value(repo.find_by_id(story.id()).await.unwrap()).unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_analysis_of_missing_story_is_not_found() {
        let (_repo, handler) = setup().await;
        let err = handler
            .handle(AnalyzeStory {
                story_id: StoryId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }
}
