//! Generation Task - 单次生成尝试
//!
//! 持有单飞登记，drop 时释放。取消只是协作式标记：
//! 已发出的网络读取不会中断，回放在下一个检查点观察到取消后放弃提交。

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::application::error::ApplicationError;
use crate::application::ports::{FlightRegistryPort, PlaybackProgress};
use crate::domain::{GenerationTarget, StoryId};

/// 单次生成尝试
pub struct GenerationTask {
    story_id: StoryId,
    target: GenerationTarget,
    attempt: u64,
    token: CancellationToken,
    flights: Arc<dyn FlightRegistryPort>,
}

impl GenerationTask {
    /// 登记单飞生成；故事已有活跃生成时返回 GenerationBusy
    pub fn begin(
        flights: &Arc<dyn FlightRegistryPort>,
        story_id: StoryId,
        target: GenerationTarget,
    ) -> Result<Self, ApplicationError> {
        let ticket = flights.try_begin(story_id, target)?;

        tracing::debug!(
            story_id = %story_id,
            target = %target,
            attempt = ticket.attempt,
            "Generation task started"
        );

        Ok(Self {
            story_id,
            target,
            attempt: ticket.attempt,
            token: ticket.token,
            flights: flights.clone(),
        })
    }

    pub fn story_id(&self) -> StoryId {
        self.story_id
    }

    pub fn target(&self) -> GenerationTarget {
        self.target
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 标记取消
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 进入提交阶段；已取消时返回 false
    pub fn seal(&self) -> bool {
        self.flights.seal(self.story_id, self.attempt)
    }

    /// 上报回放进度
    pub fn report(&self, progress: PlaybackProgress) {
        self.flights
            .record_progress(self.story_id, self.attempt, progress);
    }
}

impl std::fmt::Debug for GenerationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationTask")
            .field("story_id", &self.story_id)
            .field("target", &self.target)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Drop for GenerationTask {
    fn drop(&mut self) {
        self.flights.release(self.story_id, self.attempt);
        tracing::debug!(
            story_id = %self.story_id,
            attempt = self.attempt,
            "Generation task released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepNumber;
    use crate::infrastructure::memory::InMemoryFlightRegistry;

    fn registry() -> Arc<dyn FlightRegistryPort> {
        Arc::new(InMemoryFlightRegistry::new())
    }

    #[test]
    fn test_second_begin_is_busy_until_drop() {
        let flights = registry();
        let story_id = StoryId::new();
        let target = GenerationTarget::Step(StepNumber::FIRST);

        let first = GenerationTask::begin(&flights, story_id, target).unwrap();
        let err = GenerationTask::begin(&flights, story_id, target).unwrap_err();
        match err {
            ApplicationError::GenerationBusy { attempt, .. } => {
                assert_eq!(attempt, first.attempt())
            }
            other => panic!("unexpected error: {:?}", other),
        }

        drop(first);
        assert!(!flights.is_busy(story_id));
        assert!(GenerationTask::begin(&flights, story_id, target).is_ok());
    }

    #[test]
    fn test_cancelled_task_is_superseded() {
        let flights = registry();
        let story_id = StoryId::new();
        let target = GenerationTarget::Step(StepNumber::FIRST);

        let first = GenerationTask::begin(&flights, story_id, target).unwrap();
        assert_eq!(flights.cancel(story_id), Some(first.attempt()));
        assert!(first.is_cancelled());

        let second = GenerationTask::begin(&flights, story_id, target).unwrap();
        assert!(second.attempt() > first.attempt());

        // 旧任务退出不能释放新任务的登记
        drop(first);
        assert!(flights.is_busy(story_id));
        drop(second);
        assert!(!flights.is_busy(story_id));
    }
}
