//! Step Commands - 步骤账本写操作

use serde::{Deserialize, Serialize};

use crate::domain::{StepNumber, StoryId};

/// 生成结果的交付方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// 一次性返回
    Complete,
    /// 流式回放
    #[default]
    Streamed,
}

/// 生成步骤命令
#[derive(Debug, Clone)]
pub struct GenerateStep {
    pub story_id: StoryId,
    pub step: StepNumber,
    pub instructions: Option<String>,
    pub mode: DeliveryMode,
}

/// 精修步骤命令
#[derive(Debug, Clone)]
pub struct RefineStep {
    pub story_id: StoryId,
    pub step: StepNumber,
    pub instructions: String,
    pub mode: DeliveryMode,
}

/// 接受前沿步骤内容命令
#[derive(Debug, Clone)]
pub struct AdvanceStep {
    pub story_id: StoryId,
}

/// 回滚命令
#[derive(Debug, Clone)]
pub struct RollbackStep {
    pub story_id: StoryId,
    pub step: StepNumber,
}

/// 取消活跃生成命令
#[derive(Debug, Clone)]
pub struct CancelGeneration {
    pub story_id: StoryId,
}
