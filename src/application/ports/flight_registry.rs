//! Flight Registry Port - 单飞生成登记
//!
//! 每个故事同一时刻最多一个活跃生成。具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{GenerationTarget, StoryId};

/// 登记错误
#[derive(Debug, Error)]
pub enum FlightError {
    #[error("story {story_id} already generating {target} (attempt {attempt})")]
    Busy {
        story_id: StoryId,
        target: GenerationTarget,
        attempt: u64,
    },
}

/// 登记成功后发放的凭据
#[derive(Debug, Clone)]
pub struct FlightTicket {
    /// 单调递增的尝试编号
    pub attempt: u64,
    pub token: CancellationToken,
}

/// 回放进度快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgress {
    /// 已显示字符数
    pub displayed_chars: usize,
    /// 已接收字符数
    pub received_chars: usize,
    pub stream_closed: bool,
}

/// 活跃生成快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSnapshot {
    pub story_id: StoryId,
    pub target: GenerationTarget,
    pub attempt: u64,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub progress: PlaybackProgress,
}

/// Flight Registry Port
///
/// 已取消但尚未退出的生成不阻塞新的登记，新登记直接取代旧条目
pub trait FlightRegistryPort: Send + Sync {
    /// 尝试登记生成；故事已有未取消的活跃生成时返回 Busy
    fn try_begin(
        &self,
        story_id: StoryId,
        target: GenerationTarget,
    ) -> Result<FlightTicket, FlightError>;

    /// 取消故事的活跃生成，返回被取消的尝试编号（幂等）
    fn cancel(&self, story_id: StoryId) -> Option<u64>;

    /// 进入提交阶段；尝试已取消或已被取代时返回 false
    ///
    /// 提交阶段的生成不能再被取消，直到释放前都阻塞新的登记
    fn seal(&self, story_id: StoryId, attempt: u64) -> bool;

    /// 释放登记；仅当尝试编号匹配时移除
    fn release(&self, story_id: StoryId, attempt: u64);

    /// 记录回放进度
    fn record_progress(&self, story_id: StoryId, attempt: u64, progress: PlaybackProgress);

    /// 获取活跃生成快照
    fn snapshot(&self, story_id: StoryId) -> Option<FlightSnapshot>;

    /// 故事是否有未取消的活跃生成
    fn is_busy(&self, story_id: StoryId) -> bool {
        self.snapshot(story_id)
            .map(|s| !s.cancelled)
            .unwrap_or(false)
    }
}
