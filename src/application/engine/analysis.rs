//! Story Analyst - 大纲审阅
//!
//! 步骤 9 提交之后可以对整个大纲做一次结构化审阅。
//! 审阅占用故事的单飞登记，但只读账本，结果直接返回给调用方。

use std::sync::Arc;

use super::task::GenerationTask;
use super::workflow::WorkflowEngine;
use crate::application::error::ApplicationError;
use crate::application::ports::{GenerationPayload, GenerationRequest};
use crate::domain::{ContentKind, GenerationTarget, StepNumber, Story, StoryAnalysis};

const ANALYSIS_NAME: &str = "Story analysis";

/// 已通过校验、持有单飞登记的审阅作业
#[derive(Debug)]
pub struct AnalysisJob {
    task: GenerationTask,
    request: GenerationRequest,
}

impl AnalysisJob {
    pub fn attempt(&self) -> u64 {
        self.task.attempt()
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }
}

/// 审阅结果
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed {
        analysis: StoryAnalysis,
        attempt: u64,
    },
    Cancelled { attempt: u64 },
}

pub struct StoryAnalyst {
    engine: Arc<WorkflowEngine>,
}

impl StoryAnalyst {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// 准备审阅：步骤 9 必须已提交，且故事没有进行中的生成
    pub fn prepare(&self, story: &Story) -> Result<AnalysisJob, ApplicationError> {
        story.check_prerequisites(StepNumber::FINAL)?;
        let task = GenerationTask::begin(
            self.engine.flights(),
            story.id(),
            GenerationTarget::Analysis,
        )?;
        let request = GenerationRequest {
            story_id: story.id(),
            target: GenerationTarget::Analysis,
            step_name: ANALYSIS_NAME.to_string(),
            kind: ContentKind::Report,
            instructions: None,
            context: story.context_up_to(StepNumber::FINAL),
            current_content: None,
            scene: None,
            writing_style: story.writing_style().map(str::to_string),
            previous_chapter_sample: None,
        };

        tracing::info!(
            story_id = %story.id(),
            attempt = task.attempt(),
            "Story analysis prepared"
        );
        Ok(AnalysisJob { task, request })
    }

    /// 调用生成服务并解析审阅报告
    pub async fn run(&self, job: &AnalysisJob) -> Result<AnalysisOutcome, ApplicationError> {
        let AnalysisJob { task, request } = job;
        let attempt = task.attempt();

        let payload = self.engine.client().invoke(request).await.map_err(|e| {
            tracing::warn!(story_id = %request.story_id, error = %e, "Story analysis failed");
            ApplicationError::from(e)
        })?;
        if !task.seal() {
            return Ok(AnalysisOutcome::Cancelled { attempt });
        }

        let parsed = match payload {
            GenerationPayload::Text(text) => StoryAnalysis::from_text(&text),
            GenerationPayload::Structured(value) => StoryAnalysis::from_json(value),
        };
        let analysis = parsed.map_err(|e| ApplicationError::generation_failed(e.to_string()))?;

        tracing::info!(
            story_id = %request.story_id,
            attempt = attempt,
            high_priority = analysis.high_priority_count(),
            "Story analysis completed"
        );
        Ok(AnalysisOutcome::Completed { analysis, attempt })
    }

    /// AnalyzeStory(story)
    pub async fn analyze(&self, story: &Story) -> Result<AnalysisOutcome, ApplicationError> {
        let job = self.prepare(story)?;
        self.run(&job).await
    }
}
