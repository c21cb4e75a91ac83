//! Workflow Engine - 步骤生成编排
//!
//! 两阶段：`prepare_*` 同步完成校验、单飞登记与级联删除，
//! `run_step` 调用生成服务并提交结果。调用方可以在两阶段之间持久化级联结果。

use std::sync::Arc;

use super::playback::{PlaybackObserver, PlaybackOutcome, StreamPlayback};
use super::task::GenerationTask;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    FlightRegistryPort, FragmentStream, GenerationClientPort, GenerationPayload, GenerationRequest,
};
use crate::domain::{
    schema, GenerationTarget, LedgerError, StepContent, StepNumber, Story, StoryId,
};

/// 结果交付方式
pub enum Delivery<'a> {
    /// 一次性返回完整内容
    Complete,
    /// 流式回放
    Streamed(&'a mut dyn PlaybackObserver),
}

/// 已通过校验、持有单飞登记的步骤生成作业
#[derive(Debug)]
pub struct StepJob {
    task: GenerationTask,
    step: StepNumber,
    request: GenerationRequest,
    cascaded: Vec<StepNumber>,
}

impl StepJob {
    pub fn step(&self) -> StepNumber {
        self.step
    }

    pub fn attempt(&self) -> u64 {
        self.task.attempt()
    }

    /// 精修前被级联删除的步骤
    pub fn cascaded(&self) -> &[StepNumber] {
        &self.cascaded
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }
}

/// 步骤生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Committed {
        step: StepNumber,
        current_step: StepNumber,
        attempt: u64,
    },
    /// 取消，未提交任何内容
    Cancelled { step: StepNumber, attempt: u64 },
}

/// 工作流引擎
pub struct WorkflowEngine {
    client: Arc<dyn GenerationClientPort>,
    flights: Arc<dyn FlightRegistryPort>,
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn GenerationClientPort>, flights: Arc<dyn FlightRegistryPort>) -> Self {
        Self { client, flights }
    }

    pub fn flights(&self) -> &Arc<dyn FlightRegistryPort> {
        &self.flights
    }

    pub fn client(&self) -> &Arc<dyn GenerationClientPort> {
        &self.client
    }

    // ========================================================================
    // 同步操作
    // ========================================================================

    /// 生成进行中时拒绝修改账本
    pub fn ensure_idle(&self, story_id: StoryId) -> Result<(), ApplicationError> {
        match self.flights.snapshot(story_id) {
            Some(flight) if !flight.cancelled => Err(ApplicationError::GenerationBusy {
                story_id,
                attempt: flight.attempt,
            }),
            _ => Ok(()),
        }
    }

    /// 接受前沿步骤的现有内容
    pub fn advance(&self, story: &mut Story) -> Result<StepNumber, ApplicationError> {
        self.ensure_idle(story.id())?;
        Ok(story.advance()?)
    }

    /// 回滚到目标步骤
    pub fn rollback(
        &self,
        story: &mut Story,
        target: StepNumber,
    ) -> Result<Vec<StepNumber>, ApplicationError> {
        self.ensure_idle(story.id())?;
        Ok(story.rollback_to(target)?)
    }

    /// 取消故事的活跃生成（幂等）
    pub fn cancel(&self, story_id: StoryId) -> Option<u64> {
        let attempt = self.flights.cancel(story_id);
        if let Some(attempt) = attempt {
            tracing::info!(story_id = %story_id, attempt = attempt, "Generation cancelled");
        }
        attempt
    }

    // ========================================================================
    // 准备阶段
    // ========================================================================

    /// 准备生成步骤
    ///
    /// 目标必须是前沿步骤（回滚后重开时也可以是前沿的下一步）；
    /// 重新生成更早的步骤走 `prepare_refine`
    pub fn prepare_generate(
        &self,
        story: &Story,
        step: StepNumber,
        instructions: Option<String>,
    ) -> Result<StepJob, ApplicationError> {
        Self::check_generatable(story, step)?;
        if step < story.current_step() {
            return Err(LedgerError::OutOfOrderCommit {
                step,
                current: story.current_step(),
            }
            .into());
        }

        let task = GenerationTask::begin(&self.flights, story.id(), GenerationTarget::Step(step))?;
        let request = Self::build_request(story, step, clean_instructions(instructions), None);

        tracing::info!(
            story_id = %story.id(),
            step = %step,
            attempt = task.attempt(),
            "Step generation prepared"
        );
        Ok(StepJob {
            task,
            step,
            request,
            cascaded: Vec::new(),
        })
    }

    /// 准备精修步骤
    ///
    /// `step < current_step` 时先级联删除其后的全部步骤与章节；
    /// `step == current_step` 不级联
    pub fn prepare_refine(
        &self,
        story: &mut Story,
        step: StepNumber,
        instructions: String,
    ) -> Result<StepJob, ApplicationError> {
        let instructions = clean_instructions(Some(instructions))
            .ok_or_else(|| ApplicationError::validation("refine instructions cannot be empty"))?;
        Self::check_generatable(story, step)?;
        if step > story.current_step() {
            return Err(LedgerError::OutOfOrderCommit {
                step,
                current: story.current_step(),
            }
            .into());
        }
        let current_content = story
            .peek(step)
            .map(StepContent::render)
            .ok_or(LedgerError::StepNotReady(step))?;

        // 先登记，忙碌时不做任何修改
        let task = GenerationTask::begin(&self.flights, story.id(), GenerationTarget::Step(step))?;
        let cascaded = if step < story.current_step() {
            story.rollback_to(step)?
        } else {
            Vec::new()
        };
        let request = Self::build_request(story, step, Some(instructions), Some(current_content));

        tracing::info!(
            story_id = %story.id(),
            step = %step,
            attempt = task.attempt(),
            cascaded = ?cascaded,
            "Step refine prepared"
        );
        Ok(StepJob {
            task,
            step,
            request,
            cascaded,
        })
    }

    fn check_generatable(story: &Story, step: StepNumber) -> Result<(), LedgerError> {
        if step.is_final() {
            return Err(LedgerError::UnitStep(step));
        }
        if step.get() > story.current_step().get() + 1 {
            return Err(LedgerError::OutOfOrderCommit {
                step,
                current: story.current_step(),
            });
        }
        story.check_prerequisites(step)
    }

    fn build_request(
        story: &Story,
        step: StepNumber,
        instructions: Option<String>,
        current_content: Option<String>,
    ) -> GenerationRequest {
        let slot = schema::slot(step);
        GenerationRequest {
            story_id: story.id(),
            target: GenerationTarget::Step(step),
            step_name: slot.name.to_string(),
            kind: slot.kind,
            instructions,
            context: story.context_up_to(step),
            current_content,
            scene: None,
            writing_style: story.writing_style().map(str::to_string),
            previous_chapter_sample: None,
        }
    }

    // ========================================================================
    // 执行阶段
    // ========================================================================

    /// 执行步骤生成并提交
    ///
    /// 失败或取消时不提交，目标步骤保留原有内容。
    /// 单飞登记随 `job` 一起释放，调用方应在持久化之后再丢弃 `job`
    pub async fn run_step(
        &self,
        story: &mut Story,
        job: &StepJob,
        delivery: Delivery<'_>,
    ) -> Result<StepOutcome, ApplicationError> {
        let StepJob {
            task,
            step,
            request,
            ..
        } = job;
        let (step, attempt) = (*step, task.attempt());

        let committed = match delivery {
            Delivery::Complete => {
                let payload = self.client.invoke(request).await.map_err(|e| {
                    tracing::warn!(story_id = %story.id(), step = %step, error = %e, "Generation failed");
                    ApplicationError::from(e)
                })?;
                if !task.seal() {
                    None
                } else {
                    let content = parse_payload(step, payload)?;
                    Some(story.commit(step, content)?)
                }
            }
            Delivery::Streamed(observer) => {
                let stream = self.open_stream(request).await?;
                let kind = request.kind;
                let outcome = StreamPlayback::new(task, observer)
                    .run(stream, |text| -> Result<StepNumber, ApplicationError> {
                        let content = StepContent::from_text(kind, &text.text).map_err(|e| {
                            ApplicationError::GenerationFailed {
                                message: e.to_string(),
                                partial: Some(text.text.clone()),
                            }
                        })?;
                        Ok(story.commit(step, content)?)
                    })
                    .await;
                match outcome {
                    PlaybackOutcome::Finalized(result) => Some(result?),
                    PlaybackOutcome::Cancelled { .. } => None,
                    PlaybackOutcome::Failed { message, displayed } => {
                        return Err(ApplicationError::GenerationFailed {
                            message,
                            partial: Some(displayed),
                        })
                    }
                }
            }
        };

        match committed {
            Some(current_step) => {
                tracing::info!(
                    story_id = %story.id(),
                    step = %step,
                    current_step = %current_step,
                    attempt = attempt,
                    "Step committed"
                );
                Ok(StepOutcome::Committed {
                    step,
                    current_step,
                    attempt,
                })
            }
            None => Ok(StepOutcome::Cancelled { step, attempt }),
        }
    }

    /// 打开片段流
    pub(crate) async fn open_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, ApplicationError> {
        self.client.stream(request).await.map_err(|e| {
            tracing::warn!(
                story_id = %request.story_id,
                target = %request.target,
                error = %e,
                "Failed to open generation stream"
            );
            ApplicationError::from(e)
        })
    }

    // ========================================================================
    // 便捷组合
    // ========================================================================

    /// Generate(story, step, instructions?)
    pub async fn generate(
        &self,
        story: &mut Story,
        step: StepNumber,
        instructions: Option<String>,
        delivery: Delivery<'_>,
    ) -> Result<StepOutcome, ApplicationError> {
        let job = self.prepare_generate(story, step, instructions)?;
        self.run_step(story, &job, delivery).await
    }

    /// Refine(story, step, instructions)
    pub async fn refine(
        &self,
        story: &mut Story,
        step: StepNumber,
        instructions: String,
        delivery: Delivery<'_>,
    ) -> Result<StepOutcome, ApplicationError> {
        let job = self.prepare_refine(story, step, instructions)?;
        self.run_step(story, &job, delivery).await
    }
}

fn clean_instructions(instructions: Option<String>) -> Option<String> {
    instructions
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_payload(
    step: StepNumber,
    payload: GenerationPayload,
) -> Result<StepContent, ApplicationError> {
    let kind = schema::slot(step).kind;
    let parsed = match payload {
        GenerationPayload::Text(text) => StepContent::from_text(kind, &text),
        GenerationPayload::Structured(value) => StepContent::from_json(kind, value),
    };
    parsed.map_err(|e| ApplicationError::generation_failed(e.to_string()))
}
