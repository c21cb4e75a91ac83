//! Step Command Handlers
//!
//! 生成类命令分两段：`prepare_*` 加载、校验、登记并持久化级联结果，
//! `run` 执行生成并保存提交结果。HTTP 层在两段之间立即返回，`run` 在后台执行。

use std::sync::Arc;

use super::load_story;
use crate::application::commands::{
    AdvanceStep, CancelGeneration, DeliveryMode, GenerateStep, RefineStep, RollbackStep,
};
use crate::application::engine::{
    Delivery, PlaybackObserver, StepJob, StepOutcome, WorkflowEngine,
};
use crate::application::error::ApplicationError;
use crate::application::ports::StoryRepositoryPort;
use crate::domain::{StepNumber, Story, StoryId};

// ============================================================================
// AdvanceStep / RollbackStep
// ============================================================================

/// 账本前沿变化响应
#[derive(Debug, Clone)]
pub struct StepTransitionResponse {
    pub story_id: StoryId,
    pub current_step: StepNumber,
    /// 被删除的步骤
    pub removed: Vec<StepNumber>,
}

/// AdvanceStep Handler
pub struct AdvanceStepHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    engine: Arc<WorkflowEngine>,
}

impl AdvanceStepHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, engine: Arc<WorkflowEngine>) -> Self {
        Self { story_repo, engine }
    }

    pub async fn handle(&self, command: AdvanceStep) -> Result<StepTransitionResponse, ApplicationError> {
        let mut story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let current_step = self.engine.advance(&mut story)?;
        self.story_repo.save(&story).await?;

        tracing::info!(
            story_id = %story.id(),
            current_step = %current_step,
            "Step advanced"
        );
        Ok(StepTransitionResponse {
            story_id: story.id(),
            current_step,
            removed: Vec::new(),
        })
    }
}

/// RollbackStep Handler
pub struct RollbackStepHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    engine: Arc<WorkflowEngine>,
}

impl RollbackStepHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, engine: Arc<WorkflowEngine>) -> Self {
        Self { story_repo, engine }
    }

    pub async fn handle(&self, command: RollbackStep) -> Result<StepTransitionResponse, ApplicationError> {
        let mut story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let removed = self.engine.rollback(&mut story, command.step)?;
        if !removed.is_empty() {
            self.story_repo.save(&story).await?;
        }

        Ok(StepTransitionResponse {
            story_id: story.id(),
            current_step: story.current_step(),
            removed,
        })
    }
}

// ============================================================================
// CancelGeneration
// ============================================================================

/// 取消响应
#[derive(Debug, Clone)]
pub struct CancelGenerationResponse {
    pub story_id: StoryId,
    /// 被取消的尝试编号；没有活跃生成时为 None
    pub cancelled_attempt: Option<u64>,
}

/// CancelGeneration Handler（幂等）
pub struct CancelGenerationHandler {
    engine: Arc<WorkflowEngine>,
}

impl CancelGenerationHandler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub fn handle(&self, command: CancelGeneration) -> CancelGenerationResponse {
        CancelGenerationResponse {
            story_id: command.story_id,
            cancelled_attempt: self.engine.cancel(command.story_id),
        }
    }
}

// ============================================================================
// GenerateStep / RefineStep
// ============================================================================

/// 已准备好的步骤生成
#[derive(Debug)]
pub struct PreparedStep {
    story: Story,
    job: StepJob,
    mode: DeliveryMode,
}

impl PreparedStep {
    pub fn story_id(&self) -> StoryId {
        self.story.id()
    }

    pub fn step(&self) -> StepNumber {
        self.job.step()
    }

    pub fn attempt(&self) -> u64 {
        self.job.attempt()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn cascaded(&self) -> &[StepNumber] {
        self.job.cascaded()
    }
}

/// GenerateStep / RefineStep Handler
pub struct StepGenerationHandler {
    story_repo: Arc<dyn StoryRepositoryPort>,
    engine: Arc<WorkflowEngine>,
}

impl StepGenerationHandler {
    pub fn new(story_repo: Arc<dyn StoryRepositoryPort>, engine: Arc<WorkflowEngine>) -> Self {
        Self { story_repo, engine }
    }

    /// 校验并登记生成
    pub async fn prepare_generate(&self, command: GenerateStep) -> Result<PreparedStep, ApplicationError> {
        let story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self
            .engine
            .prepare_generate(&story, command.step, command.instructions)?;
        Ok(PreparedStep {
            story,
            job,
            mode: command.mode,
        })
    }

    /// 校验、登记并持久化级联删除
    pub async fn prepare_refine(&self, command: RefineStep) -> Result<PreparedStep, ApplicationError> {
        let mut story = load_story(self.story_repo.as_ref(), command.story_id).await?;
        let job = self
            .engine
            .prepare_refine(&mut story, command.step, command.instructions)?;
        if !job.cascaded().is_empty() {
            // 保存失败时 job 被丢弃，登记随之释放
            self.story_repo.save(&story).await?;
        }
        Ok(PreparedStep {
            story,
            job,
            mode: command.mode,
        })
    }

    /// 执行生成并保存提交结果
    ///
    /// 保存完成之前单飞登记一直保留，其他写操作看到的始终是忙碌
    pub async fn run(
        &self,
        prepared: PreparedStep,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<StepOutcome, ApplicationError> {
        let PreparedStep {
            mut story,
            job,
            mode,
        } = prepared;
        let delivery = match mode {
            DeliveryMode::Complete => Delivery::Complete,
            DeliveryMode::Streamed => Delivery::Streamed(observer),
        };

        let outcome = self.engine.run_step(&mut story, &job, delivery).await?;
        if let StepOutcome::Committed { .. } = outcome {
            self.story_repo.save(&story).await.map_err(|e| {
                tracing::error!(story_id = %story.id(), error = %e, "Failed to persist committed step");
                ApplicationError::from(e)
            })?;
        }
        drop(job);
        Ok(outcome)
    }

    /// 准备并执行生成
    pub async fn generate(
        &self,
        command: GenerateStep,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<StepOutcome, ApplicationError> {
        let prepared = self.prepare_generate(command).await?;
        self.run(prepared, observer).await
    }

    /// 准备并执行精修
    pub async fn refine(
        &self,
        command: RefineStep,
        observer: &mut dyn PlaybackObserver,
    ) -> Result<StepOutcome, ApplicationError> {
        let prepared = self.prepare_refine(command).await?;
        self.run(prepared, observer).await
    }
}
