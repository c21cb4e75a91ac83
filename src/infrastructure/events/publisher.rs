//! Event Publisher Implementation
//!
//! WebSocket 事件推送实现

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::{PlaybackObserver, PlaybackProgress};
use crate::domain::{ChapterNumber, GenerationTarget, StepNumber, StoryAnalysis, StoryId};

/// WebSocket 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StoryEvent {
    /// 生成开始
    GenerationStarted {
        story_id: StoryId,
        target: GenerationTarget,
        attempt: u64,
    },
    /// 回放进度，`delta` 为本次新显示的文本
    PlaybackProgress {
        story_id: StoryId,
        attempt: u64,
        delta: String,
        displayed_chars: usize,
        received_chars: usize,
        stream_closed: bool,
    },
    /// 步骤已提交
    StepCommitted {
        story_id: StoryId,
        step: StepNumber,
        current_step: StepNumber,
        attempt: u64,
    },
    /// 章节已提交
    ChapterCommitted {
        story_id: StoryId,
        chapter: ChapterNumber,
        word_count: usize,
        attempt: u64,
    },
    /// 账本回滚（含精修级联）
    RolledBack {
        story_id: StoryId,
        current_step: StepNumber,
        removed: Vec<StepNumber>,
    },
    /// 重新生成章节时删除了后续章节
    ChaptersTruncated {
        story_id: StoryId,
        removed: Vec<ChapterNumber>,
    },
    /// 生成失败，`partial` 为已显示的文本
    GenerationFailed {
        story_id: StoryId,
        target: GenerationTarget,
        attempt: u64,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        partial: Option<String>,
    },
    /// 生成已取消
    GenerationCancelled {
        story_id: StoryId,
        target: GenerationTarget,
        attempt: u64,
    },
    /// 大纲审阅完成；报告不写入账本
    AnalysisCompleted {
        story_id: StoryId,
        attempt: u64,
        analysis: Box<StoryAnalysis>,
    },
    /// 故事已删除
    StoryDeleted { story_id: StoryId },
}

impl StoryEvent {
    pub fn story_id(&self) -> StoryId {
        match self {
            Self::GenerationStarted { story_id, .. }
            | Self::PlaybackProgress { story_id, .. }
            | Self::StepCommitted { story_id, .. }
            | Self::ChapterCommitted { story_id, .. }
            | Self::RolledBack { story_id, .. }
            | Self::ChaptersTruncated { story_id, .. }
            | Self::GenerationFailed { story_id, .. }
            | Self::GenerationCancelled { story_id, .. }
            | Self::AnalysisCompleted { story_id, .. }
            | Self::StoryDeleted { story_id } => *story_id,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// story_id -> broadcast sender
    story_channels: DashMap<StoryId, broadcast::Sender<StoryEvent>>,
    capacity: usize,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            story_channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅故事事件，通道不存在时创建
    pub fn subscribe(&self, story_id: StoryId) -> broadcast::Receiver<StoryEvent> {
        self.story_channels
            .entry(story_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 移除故事通道，已订阅的接收端会收到关闭
    pub fn remove(&self, story_id: StoryId) {
        self.story_channels.remove(&story_id);
    }

    /// 最后一个订阅者离开后移除通道；仍有订阅者时保留
    pub fn remove_if_unsubscribed(&self, story_id: StoryId) -> bool {
        let removed = self
            .story_channels
            .remove_if(&story_id, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if removed {
            tracing::debug!(story_id = %story_id, "Event channel dropped");
        }
        removed
    }

    /// 当前打开的故事通道数
    pub fn channel_count(&self) -> usize {
        self.story_channels.len()
    }

    /// 发布事件到所属故事
    pub fn publish(&self, event: StoryEvent) {
        let story_id = event.story_id();
        if let Some(sender) = self.story_channels.get(&story_id) {
            if let Err(e) = sender.send(event) {
                tracing::debug!(
                    story_id = %story_id,
                    error = %e,
                    "Failed to publish event (no receivers)"
                );
            }
        }
    }

    /// 发布故事删除事件并关闭通道
    pub fn publish_story_deleted(&self, story_id: StoryId) {
        self.publish(StoryEvent::StoryDeleted { story_id });
        self.remove(story_id);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// 把回放进度转为 PlaybackProgress 事件的观察者
///
/// 显示的字符按批合并，追上已接收文本时立即发送
pub struct PublishingObserver {
    publisher: Arc<EventPublisher>,
    story_id: StoryId,
    attempt: u64,
    batch_chars: usize,
    pending: String,
    pending_chars: usize,
}

impl PublishingObserver {
    pub fn new(
        publisher: Arc<EventPublisher>,
        story_id: StoryId,
        attempt: u64,
        batch_chars: usize,
    ) -> Self {
        Self {
            publisher,
            story_id,
            attempt,
            batch_chars: batch_chars.max(1),
            pending: String::new(),
            pending_chars: 0,
        }
    }

    fn flush(&mut self, progress: PlaybackProgress) {
        if self.pending.is_empty() {
            return;
        }
        self.publisher.publish(StoryEvent::PlaybackProgress {
            story_id: self.story_id,
            attempt: self.attempt,
            delta: std::mem::take(&mut self.pending),
            displayed_chars: progress.displayed_chars,
            received_chars: progress.received_chars,
            stream_closed: progress.stream_closed,
        });
        self.pending_chars = 0;
    }
}

impl PlaybackObserver for PublishingObserver {
    fn on_reveal(&mut self, ch: char, progress: PlaybackProgress) {
        self.pending.push(ch);
        self.pending_chars += 1;
        if self.pending_chars >= self.batch_chars
            || progress.displayed_chars >= progress.received_chars
        {
            self.flush(progress);
        }
    }
}
