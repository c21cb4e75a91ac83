//! In-Memory Flight Registry Implementation

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FlightError, FlightRegistryPort, FlightSnapshot, FlightTicket, PlaybackProgress,
};
use crate::domain::{GenerationTarget, StoryId};

/// 活跃生成条目
struct Flight {
    target: GenerationTarget,
    attempt: u64,
    token: CancellationToken,
    started_at: DateTime<Utc>,
    progress: PlaybackProgress,
    /// 已进入提交阶段
    sealed: bool,
}

impl Flight {
    fn snapshot(&self, story_id: StoryId) -> FlightSnapshot {
        FlightSnapshot {
            story_id,
            target: self.target,
            attempt: self.attempt,
            cancelled: self.token.is_cancelled(),
            started_at: self.started_at,
            progress: self.progress,
        }
    }
}

/// 内存单飞登记表
pub struct InMemoryFlightRegistry {
    /// story_id -> Flight
    flights: DashMap<StoryId, Flight>,
    /// 全局尝试编号
    next_attempt: AtomicU64,
}

impl InMemoryFlightRegistry {
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
            next_attempt: AtomicU64::new(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 活跃条目数（含已取消未退出的）
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    fn new_flight(&self, target: GenerationTarget) -> Flight {
        Flight {
            target,
            attempt: self.next_attempt.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            started_at: Utc::now(),
            progress: PlaybackProgress::default(),
            sealed: false,
        }
    }
}

impl Default for InMemoryFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightRegistryPort for InMemoryFlightRegistry {
    fn try_begin(
        &self,
        story_id: StoryId,
        target: GenerationTarget,
    ) -> Result<FlightTicket, FlightError> {
        // entry 持有分片锁，检查与插入是原子的
        let flight = match self.flights.entry(story_id) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                if !existing.token.is_cancelled() {
                    return Err(FlightError::Busy {
                        story_id,
                        target: existing.target,
                        attempt: existing.attempt,
                    });
                }
                tracing::debug!(
                    story_id = %story_id,
                    superseded = existing.attempt,
                    "Superseding cancelled generation"
                );
                occupied.insert(self.new_flight(target));
                occupied.into_ref()
            }
            Entry::Vacant(vacant) => vacant.insert(self.new_flight(target)),
        };

        Ok(FlightTicket {
            attempt: flight.attempt,
            token: flight.token.clone(),
        })
    }

    fn cancel(&self, story_id: StoryId) -> Option<u64> {
        let flight = self.flights.get(&story_id)?;
        if flight.sealed || flight.token.is_cancelled() {
            return None;
        }
        flight.token.cancel();
        Some(flight.attempt)
    }

    fn seal(&self, story_id: StoryId, attempt: u64) -> bool {
        match self.flights.get_mut(&story_id) {
            Some(mut flight) if flight.attempt == attempt && !flight.token.is_cancelled() => {
                flight.sealed = true;
                true
            }
            _ => false,
        }
    }

    fn release(&self, story_id: StoryId, attempt: u64) {
        self.flights
            .remove_if(&story_id, |_, flight| flight.attempt == attempt);
    }

    fn record_progress(&self, story_id: StoryId, attempt: u64, progress: PlaybackProgress) {
        if let Some(mut flight) = self.flights.get_mut(&story_id) {
            if flight.attempt == attempt {
                flight.progress = progress;
            }
        }
    }

    fn snapshot(&self, story_id: StoryId) -> Option<FlightSnapshot> {
        self.flights
            .get(&story_id)
            .map(|flight| flight.snapshot(story_id))
    }
}
