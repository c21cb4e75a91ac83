//! Story Context - Errors

use thiserror::Error;

use super::{ChapterNumber, StepNumber};

/// 账本不变量违反
///
/// 所有变体都在修改之前同步返回，账本保持原状
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("step {step} requires step {missing} to be committed first")]
    PrerequisiteNotMet { step: StepNumber, missing: StepNumber },

    #[error("cannot commit step {step} while the frontier is at step {current}")]
    OutOfOrderCommit { step: StepNumber, current: StepNumber },

    #[error("step {0} has no accepted content")]
    StepNotReady(StepNumber),

    #[error("cannot roll back to step {target}: frontier is at step {current}")]
    RollbackAhead { target: StepNumber, current: StepNumber },

    #[error("step {0} is drafted chapter by chapter")]
    UnitStep(StepNumber),

    #[error("chapter {chapter} requires chapters 1..{chapter} first (completed through {frontier})")]
    ChapterOutOfOrder { chapter: ChapterNumber, frontier: u32 },

    #[error("chapter {chapter} is not the frontier chapter (frontier is {frontier})")]
    NotFrontierChapter { chapter: ChapterNumber, frontier: u32 },

    #[error("unknown step: {0}")]
    UnknownStep(u8),

    #[error("unknown chapter: {0}")]
    UnknownChapter(u32),

    #[error("invalid slug: {0:?}")]
    InvalidSlug(String),

    #[error("premise cannot be empty")]
    EmptyPremise,

    #[error("invalid content: {0}")]
    InvalidContent(String),
}
