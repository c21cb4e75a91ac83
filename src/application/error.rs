//! 应用层错误定义
//!
//! 统一的命令/查询错误类型。账本违规在任何修改或网络调用之前同步返回；
//! 生成与持久化错误都可以通过重试恢复。

use thiserror::Error;

use crate::application::ports::{FlightError, GenerationError, RepositoryError};
use crate::domain::{LedgerError, StoryId};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 账本不变量违反（PrerequisiteNotMet / OutOfOrderCommit / StepNotReady /
    /// ChapterOutOfOrder / NotFrontierChapter ...）
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// 同一故事已有进行中的生成
    #[error("generation already in progress for story {story_id} (attempt {attempt})")]
    GenerationBusy { story_id: StoryId, attempt: u64 },

    /// 生成服务或传输错误；`partial` 为回放停止时已显示的文本
    #[error("generation failed: {message}")]
    GenerationFailed {
        message: String,
        partial: Option<String>,
    },

    /// 持久化失败，内存状态可能领先于已保存状态
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 资源冲突
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建生成失败错误
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
            partial: None,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(msg) => Self::Conflict(msg),
            other => Self::PersistenceFailed(other.to_string()),
        }
    }
}

impl From<GenerationError> for ApplicationError {
    fn from(err: GenerationError) -> Self {
        Self::generation_failed(err.to_string())
    }
}

impl From<FlightError> for ApplicationError {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Busy {
                story_id, attempt, ..
            } => Self::GenerationBusy { story_id, attempt },
        }
    }
}
